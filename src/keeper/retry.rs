use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retry with linear backoff: the wait after attempt `n` is
/// `delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds or the attempts are used up. `op` receives
    /// the 1-based attempt number. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %format!("{e:#}"),
                        "{what} failed"
                    );
                    last_err = Some(e);
                }
            }

            if attempt < self.max_attempts {
                let wait = self.delay_after(attempt);
                debug!(wait_ms = wait.as_millis() as u64, "retrying {what}");
                sleep(wait).await;
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow!("no attempts configured"));
        Err(err.context(format!(
            "{what}: all {} attempts exhausted",
            self.max_attempts
        )))
    }
}
