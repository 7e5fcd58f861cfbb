//! Strict schema check for advisor replies.
//!
//! The advisor is untrusted. A reply is accepted only if it is exactly one
//! JSON object with the four expected fields and nothing else; every other
//! outcome is replaced by the fallback policy.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use super::fallback::FallbackPolicy;
use crate::models::{AdvisoryContext, DistributionAction, Recommendation, RecommendationSource};

/// What came back from asking the advisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvisorReply {
    /// No API key configured.
    Unconfigured,
    TimedOut,
    Failed(String),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireRecommendation {
    action: String,
    #[serde(alias = "usdc_amount")]
    amount: serde_json::Number,
    confidence: f64,
    reason: String,
}

/// Parse a reply body into a recommendation, rejecting anything off-schema.
pub fn parse_recommendation(raw: &str) -> Result<Recommendation> {
    let wire: WireRecommendation =
        serde_json::from_str(raw.trim()).context("reply is not a recommendation object")?;

    let action = DistributionAction::parse(&wire.action)
        .ok_or_else(|| anyhow!("unknown action {:?}", wire.action))?;
    let amount = whole_amount(&wire.amount)?;

    if !wire.confidence.is_finite() || !(0.0..=1.0).contains(&wire.confidence) {
        bail!("confidence {} outside [0, 1]", wire.confidence);
    }

    Ok(Recommendation {
        action,
        amount,
        confidence: wire.confidence,
        reason: wire.reason,
        source: RecommendationSource::Advisor,
    })
}

/// Non-negative integer that fits in `u64`. Whole-valued floats such as
/// `5000000.0` are accepted; fractions and negatives are not.
fn whole_amount(n: &serde_json::Number) -> Result<u64> {
    if let Some(v) = n.as_u64() {
        return Ok(v);
    }
    let f = n
        .as_f64()
        .ok_or_else(|| anyhow!("amount {n} is not a number"))?;
    if !f.is_finite() || f < 0.0 || f.fract() != 0.0 || f >= u64::MAX as f64 {
        bail!("amount {n} is not a non-negative whole number");
    }
    Ok(f as u64)
}

/// Turn an advisor reply into the recommendation for this tick. Never fails.
pub fn validate(
    reply: &AdvisorReply,
    fallback: &FallbackPolicy,
    ctx: &AdvisoryContext,
) -> Recommendation {
    match reply {
        AdvisorReply::Unconfigured => {
            info!("advisor not configured, using fallback policy");
        }
        AdvisorReply::TimedOut => {
            warn!("advisor timed out, using fallback policy");
        }
        AdvisorReply::Failed(err) => {
            warn!(error = %err, "advisor request failed, using fallback policy");
        }
        AdvisorReply::Text(raw) => match parse_recommendation(raw) {
            Ok(rec) => {
                info!(
                    action = rec.action.as_str(),
                    amount = rec.amount,
                    confidence = rec.confidence,
                    reason = %truncate(&rec.reason, 200),
                    "advisor recommendation"
                );
                return rec;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    reply = %truncate(raw, 200),
                    "advisor reply rejected, using fallback policy"
                );
            }
        },
    }
    fallback.recommend(ctx)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
