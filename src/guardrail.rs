//! Local safety bounds applied to every recommendation before submission.
//!
//! The ledger enforces the same caps; this check must hold on its own.

use serde::Serialize;

use crate::models::{DistributionAction, GlobalAccrualState, Recommendation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// HOLD from the advisor or fallback.
    Hold,
    /// PAUSE needs an operator; the keeper never pauses the program itself.
    PauseRequested,
    ZeroAmount,
    WindowCapReached,
    InsufficientVault,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::PauseRequested => "pause_requested",
            Self::ZeroAmount => "zero_amount",
            Self::WindowCapReached => "window_cap_reached",
            Self::InsufficientVault => "insufficient_vault",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClampDecision {
    pub proceed: bool,
    pub amount: u64,
    pub skip: Option<SkipReason>,
}

impl ClampDecision {
    fn go(amount: u64) -> Self {
        Self {
            proceed: true,
            amount,
            skip: None,
        }
    }

    fn skip(reason: SkipReason) -> Self {
        Self {
            proceed: false,
            amount: 0,
            skip: Some(reason),
        }
    }
}

/// Bound `rec` by the per-period cap, the remaining window budget and the
/// vault balance. Pure.
pub fn clamp(rec: &Recommendation, state: &GlobalAccrualState, vault_balance: u64) -> ClampDecision {
    match rec.action {
        DistributionAction::Distribute => {}
        DistributionAction::Hold => return ClampDecision::skip(SkipReason::Hold),
        DistributionAction::Pause => return ClampDecision::skip(SkipReason::PauseRequested),
    }

    if rec.amount == 0 {
        return ClampDecision::skip(SkipReason::ZeroAmount);
    }

    let remaining = state.remaining_window_budget();
    let amount = rec.amount.min(state.max_per_period).min(remaining);

    if amount == 0 {
        let reason = if remaining == 0 {
            SkipReason::WindowCapReached
        } else {
            SkipReason::ZeroAmount
        };
        return ClampDecision::skip(reason);
    }

    if vault_balance < amount {
        return ClampDecision::skip(SkipReason::InsufficientVault);
    }

    ClampDecision::go(amount)
}
