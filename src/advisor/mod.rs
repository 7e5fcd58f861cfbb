//! Advisory recommendations: an optional remote model behind a strict
//! validator, with a deterministic fallback policy.

pub mod client;
pub mod fallback;
pub mod validator;

pub use client::AdvisorClient;
pub use fallback::FallbackPolicy;
pub use validator::{parse_recommendation, validate, AdvisorReply};

use crate::models::{AdvisoryContext, Recommendation};

#[derive(Debug, Clone)]
pub struct Advisor {
    client: Option<AdvisorClient>,
    fallback: FallbackPolicy,
}

impl Advisor {
    /// `client: None` runs in fallback-only mode.
    pub fn new(client: Option<AdvisorClient>, fallback: FallbackPolicy) -> Self {
        Self { client, fallback }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub async fn recommend(&self, ctx: &AdvisoryContext) -> Recommendation {
        let reply = match &self.client {
            Some(client) => client.fetch(ctx).await,
            None => AdvisorReply::Unconfigured,
        };
        validate(&reply, &self.fallback, ctx)
    }
}
