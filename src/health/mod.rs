//! Process health derived from recent tick outcomes.
//!
//! The reconciliation loop is the only writer. Readers (the HTTP endpoint)
//! take lock-free snapshots.

pub mod server;

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use server::{router, serve};

/// Consecutive failures before the process reports `degraded`.
pub const DEGRADED_AFTER: u32 = 3;
/// Consecutive failures before the process reports `error`.
pub const ERROR_AFTER: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Degraded,
    Error,
}

impl HealthState {
    fn for_failures(consecutive_failures: u32) -> Self {
        if consecutive_failures >= ERROR_AFTER {
            Self::Error
        } else if consecutive_failures >= DEGRADED_AFTER {
            Self::Degraded
        } else {
            Self::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub status: HealthState,
    pub started_at: DateTime<Utc>,
    pub last_success_ts: Option<i64>,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct HealthReporter {
    inner: Arc<ArcSwap<HealthStatus>>,
}

impl HealthReporter {
    pub fn new(dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(HealthStatus {
                status: HealthState::Ok,
                started_at,
                last_success_ts: None,
                consecutive_failures: 0,
                total_successes: 0,
                dry_run,
            })),
        }
    }

    pub fn snapshot(&self) -> Arc<HealthStatus> {
        self.inner.load_full()
    }

    pub fn record_success(&self, tick_ts: i64) {
        self.inner.rcu(|cur| {
            let mut next = HealthStatus::clone(cur);
            next.last_success_ts = Some(tick_ts);
            next.consecutive_failures = 0;
            next.total_successes = next.total_successes.saturating_add(1);
            next.status = HealthState::Ok;
            next
        });
    }

    pub fn record_failure(&self) {
        self.inner.rcu(|cur| {
            let mut next = HealthStatus::clone(cur);
            next.consecutive_failures = next.consecutive_failures.saturating_add(1);
            next.status = HealthState::for_failures(next.consecutive_failures);
            next
        });
    }
}
