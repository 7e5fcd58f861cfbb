//! Keeper configuration, read once at startup from flags or the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::advisor::{Advisor, AdvisorClient, FallbackPolicy};
use crate::keeper::{KeeperSettings, RetryPolicy};
use crate::ledger::{KeeperKeypair, Pubkey};

pub const DEFAULT_PROGRAM_ID: &str = "GrkW1111111111111111111111111111111111111111";

#[derive(Parser, Debug, Clone)]
#[command(name = "gorkwheel-keeper")]
#[command(about = "Advances the reward accrual index once per period")]
pub struct KeeperConfig {
    /// Ledger JSON-RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = "https://api.devnet.solana.com")]
    pub rpc_url: String,

    /// Keeper secret: base58 or a JSON byte array
    #[arg(long, env = "KEEPER_PRIVATE_KEY", hide_env_values = true)]
    pub keeper_private_key: Option<String>,

    /// Keeper keypair file (used when no secret is given inline)
    #[arg(long, env = "KEEPER_KEYPAIR_PATH")]
    pub keeper_keypair_path: Option<PathBuf>,

    #[arg(long, env = "PROGRAM_ID", default_value = DEFAULT_PROGRAM_ID)]
    pub program_id: Pubkey,

    /// Share mint whose supply divides each distribution
    #[arg(long, env = "GORK_MINT")]
    pub gork_mint: Pubkey,

    /// Advisor API key; without it only the fallback policy is used
    #[arg(long, env = "GORK_API_KEY", hide_env_values = true)]
    pub gork_api_key: Option<String>,

    #[arg(long, env = "GORK_API_URL", default_value = "https://api.x.ai/v1")]
    pub gork_api_url: String,

    #[arg(long, env = "GORK_MODEL", default_value = "grok-2-latest")]
    pub gork_model: String,

    #[arg(long, env = "ADVISOR_TIMEOUT_SECS", default_value = "10")]
    pub advisor_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value = "3001")]
    pub health_port: u16,

    /// Log submissions instead of sending them
    #[arg(
        long,
        env = "DRY_RUN",
        default_value = "false",
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub dry_run: bool,

    /// Fallback distribution amount in minor units
    #[arg(long, env = "DEFAULT_DISTRIBUTE_AMOUNT", default_value = "1000000")]
    pub default_distribute_amount: u64,

    #[arg(long, env = "KEEPER_PERIOD_SECS", default_value = "60")]
    pub keeper_period_secs: u64,

    #[arg(long, env = "KEEPER_MAX_RETRIES", default_value = "3")]
    pub keeper_max_retries: u32,

    #[arg(long, env = "KEEPER_RETRY_DELAY_MS", default_value = "5000")]
    pub keeper_retry_delay_ms: u64,

    #[arg(long, env = "DISTRIBUTION_WINDOW_SECS", default_value = "86400")]
    pub distribution_window_secs: i64,
}

impl KeeperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keeper_period_secs == 0 {
            bail!("KEEPER_PERIOD_SECS must be greater than zero");
        }
        if self.keeper_max_retries == 0 {
            bail!("KEEPER_MAX_RETRIES must be greater than zero");
        }
        if self.default_distribute_amount == 0 {
            bail!("DEFAULT_DISTRIBUTE_AMOUNT must be greater than zero");
        }
        if self.distribution_window_secs <= 0 {
            bail!("DISTRIBUTION_WINDOW_SECS must be greater than zero");
        }
        if self.advisor_timeout_secs == 0 {
            bail!("ADVISOR_TIMEOUT_SECS must be greater than zero");
        }
        Ok(())
    }

    /// Inline secret wins over the keypair file.
    pub fn keeper_keypair(&self) -> Result<KeeperKeypair> {
        if let Some(secret) = self
            .keeper_private_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            return KeeperKeypair::from_secret_str(secret).context("invalid KEEPER_PRIVATE_KEY");
        }
        if let Some(path) = &self.keeper_keypair_path {
            return KeeperKeypair::from_file(path);
        }
        bail!("KEEPER_PRIVATE_KEY or KEEPER_KEYPAIR_PATH must be set")
    }

    pub fn advisor_api_key(&self) -> Option<&str> {
        self.gork_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn advisor(&self, http: reqwest::Client) -> Advisor {
        let client = self.advisor_api_key().map(|key| {
            AdvisorClient::new(
                http,
                key,
                self.gork_api_url.clone(),
                self.gork_model.clone(),
                Duration::from_secs(self.advisor_timeout_secs),
            )
        });
        Advisor::new(client, FallbackPolicy::new(self.default_distribute_amount))
    }

    pub fn keeper_settings(&self) -> KeeperSettings {
        KeeperSettings {
            period: Duration::from_secs(self.keeper_period_secs),
            window_secs: self.distribution_window_secs,
            dry_run: self.dry_run,
            retry: RetryPolicy::new(
                self.keeper_max_retries,
                Duration::from_millis(self.keeper_retry_delay_ms),
            ),
        }
    }

    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.health_port))
    }
}
