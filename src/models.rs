use serde::{Deserialize, Serialize};

use crate::ledger::Pubkey;

/// Global accrual account as stored by the ledger program.
///
/// The keeper only reads this. `distributed_this_window` counts against a
/// rolling window that starts at `window_start_ts`; the ledger resets it
/// lazily on the first update after the window has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalAccrualState {
    pub admin: Pubkey,
    pub keeper: Pubkey,
    pub paused: bool,
    pub last_update_ts: i64,
    pub global_index: u128,
    pub reward_mint: Pubkey,
    pub reward_vault: Pubkey,
    pub max_per_period: u64,
    pub max_per_window: u64,
    pub distributed_this_window: u64,
    pub window_start_ts: i64,
    pub bump: u8,
}

impl GlobalAccrualState {
    pub fn window_expired(&self, now: i64, window_secs: i64) -> bool {
        now.saturating_sub(self.window_start_ts) >= window_secs
    }

    /// Amount already counted against the window as the ledger will see it at
    /// `now`: zero once the window has rolled over.
    pub fn effective_window_distributed(&self, now: i64, window_secs: i64) -> u64 {
        if self.window_expired(now, window_secs) {
            0
        } else {
            self.distributed_this_window
        }
    }

    /// Copy of the state with the rolling-window reset applied at `now`.
    pub fn with_window_rolled(&self, now: i64, window_secs: i64) -> Self {
        let mut view = self.clone();
        if self.window_expired(now, window_secs) {
            view.distributed_this_window = 0;
            view.window_start_ts = now;
        }
        view
    }

    pub fn remaining_window_budget(&self) -> u64 {
        self.max_per_window
            .saturating_sub(self.distributed_this_window)
    }
}

/// Per-participant accrual account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccrualState {
    pub owner: Pubkey,
    pub user_index: u128,
    pub pending_rewards: u64,
    pub bump: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistributionAction {
    Distribute,
    Hold,
    Pause,
}

impl DistributionAction {
    /// Exact match against the wire literals; anything else is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DISTRIBUTE" => Some(Self::Distribute),
            "HOLD" => Some(Self::Hold),
            "PAUSE" => Some(Self::Pause),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Distribute => "DISTRIBUTE",
            Self::Hold => "HOLD",
            Self::Pause => "PAUSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Advisor,
    Fallback,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advisor => "advisor",
            Self::Fallback => "fallback",
        }
    }
}

/// A proposed action for one tick. Produced fresh every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub action: DistributionAction,
    pub amount: u64,
    pub confidence: f64,
    pub reason: String,
    pub source: RecommendationSource,
}

/// Snapshot handed to the advisor and the fallback policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisoryContext {
    pub current_index: u128,
    pub vault_balance: u64,
    pub distributed_this_window: u64,
    pub max_per_period: u64,
    pub max_per_window: u64,
    pub last_update_ts: i64,
}

impl AdvisoryContext {
    pub fn from_state(state: &GlobalAccrualState, vault_balance: u64) -> Self {
        Self {
            current_index: state.global_index,
            vault_balance,
            distributed_this_window: state.distributed_this_window,
            max_per_period: state.max_per_period,
            max_per_window: state.max_per_window,
            last_update_ts: state.last_update_ts,
        }
    }
}

/// Context passed along with a submission, used for logging and receipts.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitContext {
    pub tick_id: u64,
    pub tick_ts: i64,
    pub source: RecommendationSource,
    pub confidence: f64,
}

/// Opaque identifier of a confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt(pub String);

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
