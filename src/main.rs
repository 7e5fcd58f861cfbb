//! Gorkwheel keeper
//!
//! Advances the reward accrual index once per period. Amounts come from an
//! optional advisor, are clamped locally, and are submitted as
//! `update_index` transactions signed by the keeper key.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gorkwheel_keeper::config::KeeperConfig;
use gorkwheel_keeper::health::{self, HealthReporter};
use gorkwheel_keeper::keeper::Keeper;
use gorkwheel_keeper::ledger::rpc::RpcClient;
use gorkwheel_keeper::ledger::{LedgerClient, SolanaLedgerClient};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cfg = KeeperConfig::parse();
    cfg.validate().context("invalid configuration")?;

    let keeper_key = cfg.keeper_keypair().context("failed to load keeper key")?;

    info!("🚀 Gorkwheel keeper starting");
    info!("  RPC:      {}", cfg.rpc_url);
    info!("  Program:  {}", cfg.program_id);
    info!("  Mint:     {}", cfg.gork_mint);
    info!("  Keeper:   {}", keeper_key.pubkey());
    info!("  Dry run:  {}", cfg.dry_run);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let ledger = SolanaLedgerClient::new(
        RpcClient::new(http.clone(), cfg.rpc_url.clone()),
        keeper_key,
        cfg.program_id,
        cfg.gork_mint,
    )
    .context("failed to derive program addresses")?;
    info!("  State:    {}", ledger.global_state_address());
    info!("  Vault:    {}", ledger.reward_vault());
    let reward_vault = ledger.reward_vault();

    let advisor = cfg.advisor(http);
    if !advisor.is_configured() {
        warn!("GORK_API_KEY not set; using the fallback distribution policy only");
    }

    let reporter = HealthReporter::new(cfg.dry_run, Utc::now());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_addr = cfg.health_addr();
    let listener = TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("failed to bind health server on {health_addr}"))?;
    let health_server = tokio::spawn(health::serve(listener, reporter.clone(), shutdown_rx.clone()));

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received; finishing current tick");
        let _ = shutdown_tx.send(true);
    });

    let ledger: Arc<dyn LedgerClient> = Arc::new(ledger);
    let keeper = Keeper::new(ledger, advisor, reporter, reward_vault, cfg.keeper_settings());
    keeper.run(shutdown_rx).await;

    match health_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %format!("{e:#}"), "health server failed"),
        Err(e) => error!(error = %e, "health server task panicked"),
    }

    info!("keeper stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gorkwheel_keeper=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when running from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
