//! Accrual Inspector CLI
//!
//! Read-only view of the accrual program: global state, vault balance,
//! window usage and, optionally, one participant's claimable rewards.
//!
//! Usage:
//!   cargo run --bin accrual_inspect -- --gork-mint MINT
//!   cargo run --bin accrual_inspect -- --gork-mint MINT --owner WALLET
//!   cargo run --bin accrual_inspect -- --gork-mint MINT --json

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Parser;
use serde::Serialize;

use gorkwheel_keeper::accrual::{claimable, INDEX_SCALE};
use gorkwheel_keeper::config::DEFAULT_PROGRAM_ID;
use gorkwheel_keeper::ledger::rpc::RpcClient;
use gorkwheel_keeper::ledger::{LedgerClient, Pubkey, SolanaLedgerClient};
use gorkwheel_keeper::models::{GlobalAccrualState, UserAccrualState};

#[derive(Parser, Debug)]
#[command(name = "accrual_inspect")]
#[command(about = "Inspect the on-chain accrual index and participant rewards")]
struct Args {
    #[arg(long, env = "RPC_URL", default_value = "https://api.devnet.solana.com")]
    rpc_url: String,

    #[arg(long, env = "PROGRAM_ID", default_value = DEFAULT_PROGRAM_ID)]
    program_id: Pubkey,

    /// Share mint whose supply divides distributions
    #[arg(long, env = "GORK_MINT")]
    gork_mint: Pubkey,

    /// Participant wallet to report claimable rewards for (optional)
    #[arg(long)]
    owner: Option<Pubkey>,

    #[arg(long, env = "DISTRIBUTION_WINDOW_SECS", default_value = "86400")]
    window_secs: i64,

    /// Print a JSON report instead of text
    #[arg(long, default_value = "false")]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ParticipantReport {
    #[serde(serialize_with = "as_string")]
    owner: Pubkey,
    initialized: bool,
    share_balance: u64,
    pending_rewards: u64,
    claimable: u64,
}

#[derive(Debug, Serialize)]
struct Report {
    #[serde(serialize_with = "as_string")]
    global_state: Pubkey,
    #[serde(serialize_with = "as_string")]
    reward_vault: Pubkey,
    vault_balance: u64,
    share_supply: Option<u64>,
    window_expired: bool,
    window_remaining: u64,
    #[serde(serialize_with = "as_string")]
    global_index: u128,
    participant: Option<ParticipantReport>,
}

/// Base58 for keys, decimal text for the u128 index.
fn as_string<T: std::fmt::Display, S: serde::Serializer>(v: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(v)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let http = reqwest::Client::new();
    let ledger = SolanaLedgerClient::read_only(
        RpcClient::new(http, args.rpc_url.clone()),
        args.program_id,
        args.gork_mint,
    )?;

    let state = ledger
        .read_global_state()
        .await
        .context("Failed to read global state")?;
    let vault_balance = ledger
        .read_balance(&state.reward_vault)
        .await
        .context("Failed to read vault balance")?;
    let share_supply = ledger.read_share_supply().await.ok();

    let now = Utc::now().timestamp();
    let rolled = state.with_window_rolled(now, args.window_secs);

    let participant = match args.owner {
        Some(owner) => Some(inspect_participant(&ledger, &state, owner).await?),
        None => None,
    };

    let report = Report {
        global_state: ledger.global_state_address(),
        reward_vault: state.reward_vault,
        vault_balance,
        share_supply,
        window_expired: state.window_expired(now, args.window_secs),
        window_remaining: rolled.remaining_window_budget(),
        global_index: state.global_index,
        participant,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_state(&ledger, &state, &report);
    Ok(())
}

async fn inspect_participant(
    ledger: &SolanaLedgerClient,
    state: &GlobalAccrualState,
    owner: Pubkey,
) -> Result<ParticipantReport> {
    let user: Option<UserAccrualState> = ledger
        .read_user_state(&owner)
        .await
        .context("Failed to read user state")?;
    let share_balance = ledger
        .read_share_balance(&owner)
        .await
        .context("Failed to read share balance")?;

    // an uninitialized participant has no checkpoint and accrues nothing yet
    let (initialized, pending, owed) = match &user {
        Some(u) => (
            true,
            u.pending_rewards,
            claimable(state.global_index, u.user_index, u.pending_rewards, share_balance),
        ),
        None => (false, 0, 0),
    };

    Ok(ParticipantReport {
        owner,
        initialized,
        share_balance,
        pending_rewards: pending,
        claimable: owed,
    })
}

fn print_state(ledger: &SolanaLedgerClient, state: &GlobalAccrualState, report: &Report) {
    println!("=== Accrual Inspector ===");
    println!("RPC:            {}", ledger.rpc_url());
    println!("Program:        {}", ledger.program_id());
    println!("Global state:   {}", report.global_state);
    println!("Admin:          {}", state.admin);
    println!("Keeper:         {}", state.keeper);
    println!("Paused:         {}", state.paused);
    println!();

    println!("--- Index ---");
    println!(
        "Global index:   {} ({:.6} per share)",
        state.global_index,
        state.global_index as f64 / INDEX_SCALE as f64
    );
    println!("Last update:    {}", fmt_ts(state.last_update_ts));
    match report.share_supply {
        Some(supply) => println!("Share supply:   {supply}"),
        None => println!("Share supply:   unavailable"),
    }
    println!();

    println!("--- Vault ---");
    println!("Reward vault:   {}", report.reward_vault);
    println!("Balance:        {}", fmt_usdc(report.vault_balance));
    if report.reward_vault != ledger.reward_vault() {
        println!("WARNING: state vault differs from derived {}", ledger.reward_vault());
    }
    println!();

    println!("--- Limits ---");
    println!("Max per period: {}", fmt_usdc(state.max_per_period));
    println!("Max per window: {}", fmt_usdc(state.max_per_window));
    println!(
        "Window:         started {}{}",
        fmt_ts(state.window_start_ts),
        if report.window_expired { " (expired)" } else { "" }
    );
    println!("Distributed:    {}", fmt_usdc(state.distributed_this_window));
    println!("Remaining:      {}", fmt_usdc(report.window_remaining));

    if let Some(p) = &report.participant {
        println!();
        println!("--- Participant {} ---", p.owner);
        if !p.initialized {
            println!("No user state account; nothing accrued yet");
        }
        println!("Share balance:  {}", p.share_balance);
        println!("Pending:        {}", fmt_usdc(p.pending_rewards));
        println!("Claimable:      {}", fmt_usdc(p.claimable));
    }

    println!("=== Inspection Complete ===");
}

fn fmt_usdc(minor: u64) -> String {
    format!("{}.{:06} USDC", minor / 1_000_000, minor % 1_000_000)
}

fn fmt_ts(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => format!("{} ({ts})", dt.format("%Y-%m-%d %H:%M:%S UTC")),
        None => ts.to_string(),
    }
}
