use crate::models::{AdvisoryContext, DistributionAction, Recommendation, RecommendationSource};

/// Deterministic recommendation used whenever the advisor cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    default_amount: u64,
}

impl FallbackPolicy {
    pub fn new(default_amount: u64) -> Self {
        Self { default_amount }
    }

    pub fn default_amount(&self) -> u64 {
        self.default_amount
    }

    /// Hold when the vault cannot cover two more periods or when the default
    /// amount would overrun the window cap; otherwise distribute the default
    /// amount bounded by the per-period cap. Runway is checked first.
    pub fn recommend(&self, ctx: &AdvisoryContext) -> Recommendation {
        let d = self.default_amount;

        if ctx.vault_balance < d.saturating_mul(2) {
            return hold("vault balance is too low for safe distribution");
        }

        if ctx.distributed_this_window.saturating_add(d) > ctx.max_per_window {
            return hold("window distribution cap reached");
        }

        Recommendation {
            action: DistributionAction::Distribute,
            amount: d.min(ctx.max_per_period),
            confidence: 0.9,
            reason: "default deterministic distribution".to_string(),
            source: RecommendationSource::Fallback,
        }
    }
}

fn hold(reason: &str) -> Recommendation {
    Recommendation {
        action: DistributionAction::Hold,
        amount: 0,
        confidence: 1.0,
        reason: reason.to_string(),
        source: RecommendationSource::Fallback,
    }
}
