use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::validator::AdvisorReply;
use crate::models::AdvisoryContext;

const MAX_TOKENS: u32 = 256;

const SYSTEM_PROMPT: &str = "You are the treasury advisor of a reward distribution program. \
Recommend how much USDC (in micro-USDC) to distribute to share holders this period from the reward vault.
Respond ONLY with a JSON object matching this exact schema, no markdown and no extra text:
{\"action\": \"DISTRIBUTE\" | \"HOLD\" | \"PAUSE\", \"amount\": <integer micro-USDC, 0 for HOLD/PAUSE>, \"confidence\": <number 0.0-1.0>, \"reason\": \"<one sentence>\"}
Never recommend more than max_per_period. Recommend HOLD when the vault balance is low.";

/// Messages-style chat client for the advisory model.
#[derive(Clone)]
pub struct AdvisorClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for AdvisorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl AdvisorClient {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }

    /// Ask for a recommendation, bounded by the configured timeout.
    pub async fn fetch(&self, ctx: &AdvisoryContext) -> AdvisorReply {
        match tokio::time::timeout(self.timeout, self.request(ctx)).await {
            Err(_) => AdvisorReply::TimedOut,
            Ok(Err(e)) => AdvisorReply::Failed(format!("{e:#}")),
            Ok(Ok(text)) => AdvisorReply::Text(text),
        }
    }

    async fn request(&self, ctx: &AdvisoryContext) -> Result<String> {
        let start = Instant::now();
        let user = user_prompt(ctx);
        let req = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: [ChatMessage {
                role: "user",
                content: &user,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .context("advisor request")?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let snippet: String = body.chars().take(800).collect();
            return Err(anyhow!("advisor {}: {}", status.as_u16(), snippet));
        }

        let parsed: Value = serde_json::from_str(&body).context("advisor json parse")?;
        let text = reply_text(&parsed).ok_or_else(|| anyhow!("advisor reply carried no text"))?;

        debug!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "advisor replied"
        );
        Ok(text.to_string())
    }
}

/// Text of the first content block, in either messages or chat-completions shape.
fn reply_text(body: &Value) -> Option<&str> {
    body.pointer("/content/0/text")
        .or_else(|| body.pointer("/choices/0/message/content"))
        .and_then(Value::as_str)
}

fn user_prompt(ctx: &AdvisoryContext) -> String {
    format!(
        "Current state (amounts in micro-USDC):\n\
         - current_index: {}\n\
         - vault_balance: {}\n\
         - distributed_this_window: {}\n\
         - max_per_period: {}\n\
         - max_per_window: {}\n\
         - last_update_ts: {}\n\
         Provide your distribution recommendation.",
        ctx.current_index,
        ctx.vault_balance,
        ctx.distributed_this_window,
        ctx.max_per_period,
        ctx.max_per_window,
        ctx.last_update_ts,
    )
}
