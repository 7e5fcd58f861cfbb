//! The reconciliation loop.
//!
//! Each tick reads the accrual state and vault balance, checks eligibility,
//! asks the advisor (or the fallback policy) for an amount, clamps it, and
//! submits `update_index` with bounded retries. Only retry exhaustion counts
//! as a failure for health purposes.

pub mod retry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};

use crate::advisor::Advisor;
use crate::guardrail::{clamp, SkipReason};
use crate::health::HealthReporter;
use crate::ledger::{LedgerClient, Pubkey};
use crate::models::{AdvisoryContext, DistributionAction, Receipt, SubmitContext};

pub use retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct KeeperSettings {
    /// Tick period; also the minimum spacing between index updates.
    pub period: Duration,
    /// Length of the rolling distribution window.
    pub window_secs: i64,
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    Paused,
    TooEarly { elapsed: i64 },
    VaultMismatch,
    Clamp(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// `receipt` is `None` in dry-run mode.
    Submitted { amount: u64, receipt: Option<Receipt> },
    Skipped(SkipCause),
    ReadFailed(String),
    Failed(String),
}

pub struct Keeper {
    ledger: Arc<dyn LedgerClient>,
    advisor: Advisor,
    health: HealthReporter,
    reward_vault: Pubkey,
    settings: KeeperSettings,
    ticks: AtomicU64,
    /// Ticks in a row that could not read the ledger. Not a health failure.
    read_failures: AtomicU64,
    /// Ticks in a row whose state named a different reward vault.
    vault_mismatches: AtomicU64,
}

impl Keeper {
    /// `reward_vault` is the vault address derived for the configured
    /// program; ticks are skipped if the ledger state disagrees.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        advisor: Advisor,
        health: HealthReporter,
        reward_vault: Pubkey,
        settings: KeeperSettings,
    ) -> Self {
        Self {
            ledger,
            advisor,
            health,
            reward_vault,
            settings,
            ticks: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            vault_mismatches: AtomicU64::new(0),
        }
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    pub fn consecutive_read_failures(&self) -> u64 {
        self.read_failures.load(Ordering::Relaxed)
    }

    pub fn consecutive_vault_mismatches(&self) -> u64 {
        self.vault_mismatches.load(Ordering::Relaxed)
    }

    /// Tick immediately, then every period until `shutdown` is set. Missed
    /// ticks are dropped. An in-flight tick always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_secs = self.settings.period.as_secs(),
            dry_run = self.settings.dry_run,
            advisor = self.advisor.is_configured(),
            "keeper loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("keeper loop stopped");
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now().timestamp()).await
    }

    /// Run one tick as of unix time `now`.
    pub async fn tick_at(&self, now: i64) -> TickOutcome {
        let tick_id = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        self.reconcile(tick_id, now)
            .instrument(info_span!("tick", tick_id))
            .await
    }

    async fn reconcile(&self, tick_id: u64, now: i64) -> TickOutcome {
        let reads = tokio::try_join!(
            self.ledger.read_global_state(),
            self.ledger.read_balance(&self.reward_vault),
        );
        let (state, vault_balance) = match reads {
            Ok(v) => {
                self.read_failures.store(0, Ordering::Relaxed);
                v
            }
            Err(e) => {
                let consecutive = self.read_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    error = %format!("{e:#}"),
                    consecutive_read_failures = consecutive,
                    "failed to read ledger state; skipping tick"
                );
                return TickOutcome::ReadFailed(format!("{e:#}"));
            }
        };

        if state.reward_vault != self.reward_vault {
            let consecutive = self.vault_mismatches.fetch_add(1, Ordering::Relaxed) + 1;
            error!(
                expected = %self.reward_vault,
                actual = %state.reward_vault,
                consecutive_vault_mismatches = consecutive,
                "reward vault in state does not match derived address; skipping tick"
            );
            return TickOutcome::Skipped(SkipCause::VaultMismatch);
        }
        self.vault_mismatches.store(0, Ordering::Relaxed);

        if state.paused {
            warn!("program is paused; skipping tick");
            return TickOutcome::Skipped(SkipCause::Paused);
        }

        let elapsed = now.saturating_sub(state.last_update_ts);
        let period_secs = i64::try_from(self.settings.period.as_secs()).unwrap_or(i64::MAX);
        if elapsed < period_secs {
            info!(elapsed, period_secs, "too early since last update; skipping tick");
            return TickOutcome::Skipped(SkipCause::TooEarly { elapsed });
        }

        // the ledger resets an expired window on the next update
        let view = state.with_window_rolled(now, self.settings.window_secs);
        if view.distributed_this_window != state.distributed_this_window {
            info!(
                window_start_ts = state.window_start_ts,
                "distribution window expired; treating window total as zero"
            );
        }

        let ctx = AdvisoryContext::from_state(&view, vault_balance);
        let rec = self.advisor.recommend(&ctx).await;

        if rec.action == DistributionAction::Pause {
            warn!(reason = %rec.reason, "advisor recommends PAUSE; keeper cannot pause, human review needed");
        }

        let decision = clamp(&rec, &view, vault_balance);
        let Some(amount) = decision.proceed.then_some(decision.amount) else {
            let reason = decision.skip.unwrap_or(SkipReason::ZeroAmount);
            info!(
                action = rec.action.as_str(),
                recommended = rec.amount,
                vault_balance,
                skip = reason.as_str(),
                "no distribution this tick"
            );
            return TickOutcome::Skipped(SkipCause::Clamp(reason));
        };

        info!(
            amount,
            recommended = rec.amount,
            source = rec.source.as_str(),
            confidence = rec.confidence,
            "submitting update_index"
        );

        let submit_ctx = SubmitContext {
            tick_id,
            tick_ts: now,
            source: rec.source,
            confidence: rec.confidence,
        };
        let dry_run = self.settings.dry_run;
        let submitted = self
            .settings
            .retry
            .run("update_index", |_attempt| {
                self.ledger.submit_distribution(amount, &submit_ctx, dry_run)
            })
            .await;

        match submitted {
            Ok(receipt) => {
                match &receipt {
                    Some(sig) => info!(signature = %sig, amount, "update_index confirmed"),
                    None => info!(amount, "dry run complete"),
                }
                self.health.record_success(now);
                TickOutcome::Submitted { amount, receipt }
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "update_index failed; all retries exhausted");
                self.health.record_failure();
                TickOutcome::Failed(format!("{e:#}"))
            }
        }
    }
}
