//! Reconciliation loop against an in-memory ledger.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use gorkwheel_keeper::advisor::{Advisor, FallbackPolicy};
use gorkwheel_keeper::guardrail::SkipReason;
use gorkwheel_keeper::health::{HealthReporter, HealthState};
use gorkwheel_keeper::keeper::{Keeper, KeeperSettings, RetryPolicy, SkipCause, TickOutcome};
use gorkwheel_keeper::ledger::{LedgerClient, Pubkey};
use gorkwheel_keeper::models::{GlobalAccrualState, Receipt, SubmitContext};

const T0: i64 = 1_700_000_000;
const VAULT: Pubkey = Pubkey::new_from_array([4; 32]);

fn state() -> GlobalAccrualState {
    GlobalAccrualState {
        admin: Pubkey::new_from_array([1; 32]),
        keeper: Pubkey::new_from_array([2; 32]),
        paused: false,
        last_update_ts: T0,
        global_index: 0,
        reward_mint: Pubkey::new_from_array([3; 32]),
        reward_vault: VAULT,
        max_per_period: 1_000_000,
        max_per_window: 100_000_000,
        distributed_this_window: 0,
        window_start_ts: T0,
        bump: 255,
    }
}

fn stale_state() -> GlobalAccrualState {
    let mut s = state();
    // far in the past so every wall-clock tick is eligible
    s.last_update_ts = 0;
    s.window_start_ts = 0;
    s
}

#[derive(Debug, Clone, PartialEq)]
struct Submission {
    amount: u64,
    dry_run: bool,
    tick_ts: i64,
    at: Instant,
}

struct MockLedger {
    state: Mutex<GlobalAccrualState>,
    balance: u64,
    fail_reads: AtomicBool,
    /// Submissions fail while this is non-zero; each failure decrements it.
    failures_left: AtomicU32,
    /// How long each submission takes before it resolves.
    submit_delay: Duration,
    inflight: AtomicU32,
    max_inflight: AtomicU32,
    submissions: Mutex<Vec<Submission>>,
}

impl MockLedger {
    fn new(state: GlobalAccrualState, balance: u64) -> Arc<Self> {
        Self::with_submit_delay(state, balance, Duration::ZERO)
    }

    fn with_submit_delay(state: GlobalAccrualState, balance: u64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            balance,
            fail_reads: AtomicBool::new(false),
            failures_left: AtomicU32::new(0),
            submit_delay: delay,
            inflight: AtomicU32::new(0),
            max_inflight: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
        })
    }

    fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LedgerClient for MockLedger {
    async fn read_global_state(&self) -> Result<GlobalAccrualState> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("rpc unavailable"));
        }
        Ok(self.state.lock().unwrap().clone())
    }

    async fn read_balance(&self, account: &Pubkey) -> Result<u64> {
        assert_eq!(*account, VAULT);
        Ok(self.balance)
    }

    async fn submit_distribution(
        &self,
        amount: u64,
        ctx: &SubmitContext,
        dry_run: bool,
    ) -> Result<Option<Receipt>> {
        self.submissions.lock().unwrap().push(Submission {
            amount,
            dry_run,
            tick_ts: ctx.tick_ts,
            at: Instant::now(),
        });

        let running = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(running, Ordering::SeqCst);
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(anyhow!("blockhash not found"));
        }
        if dry_run {
            return Ok(None);
        }
        Ok(Some(Receipt(format!("sig-{}", ctx.tick_id))))
    }
}

fn settings(dry_run: bool) -> KeeperSettings {
    KeeperSettings {
        period: Duration::from_secs(60),
        window_secs: 86_400,
        dry_run,
        retry: RetryPolicy::new(3, Duration::from_millis(5_000)),
    }
}

fn keeper(ledger: Arc<MockLedger>, dry_run: bool) -> Keeper {
    Keeper::new(
        ledger,
        Advisor::new(None, FallbackPolicy::new(1_000_000)),
        HealthReporter::new(dry_run, Utc::now()),
        VAULT,
        settings(dry_run),
    )
}

#[tokio::test]
async fn eligible_tick_submits_clamped_fallback_amount() {
    let ledger = MockLedger::new(state(), 50_000_000);
    let keeper = keeper(ledger.clone(), false);

    let outcome = keeper.tick_at(T0 + 61).await;
    assert_eq!(
        outcome,
        TickOutcome::Submitted {
            amount: 1_000_000,
            receipt: Some(Receipt("sig-1".into())),
        }
    );

    let subs = ledger.submissions();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].amount, 1_000_000);
    assert_eq!(subs[0].tick_ts, T0 + 61);
    assert!(!subs[0].dry_run);

    let health = keeper.health().snapshot();
    assert_eq!(health.total_successes, 1);
    assert_eq!(health.last_success_ts, Some(T0 + 61));
}

#[tokio::test]
async fn too_early_skips_without_touching_health() {
    let ledger = MockLedger::new(state(), 50_000_000);
    let keeper = keeper(ledger.clone(), false);

    let outcome = keeper.tick_at(T0 + 30).await;
    assert_eq!(
        outcome,
        TickOutcome::Skipped(SkipCause::TooEarly { elapsed: 30 })
    );
    assert!(ledger.submissions().is_empty());

    let health = keeper.health().snapshot();
    assert_eq!(health.status, HealthState::Ok);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.total_successes, 0);
}

#[tokio::test]
async fn paused_program_is_skipped() {
    let mut s = state();
    s.paused = true;
    let ledger = MockLedger::new(s, 50_000_000);
    let keeper = keeper(ledger.clone(), false);

    assert_eq!(
        keeper.tick_at(T0 + 600).await,
        TickOutcome::Skipped(SkipCause::Paused)
    );
    assert!(ledger.submissions().is_empty());
}

#[tokio::test]
async fn foreign_vault_is_skipped() {
    let mut s = state();
    s.reward_vault = Pubkey::new_from_array([99; 32]);
    let ledger = MockLedger::new(s, 50_000_000);
    let keeper = keeper(ledger.clone(), false);

    for _ in 0..3 {
        assert_eq!(
            keeper.tick_at(T0 + 600).await,
            TickOutcome::Skipped(SkipCause::VaultMismatch)
        );
    }
    assert!(ledger.submissions().is_empty());
    assert_eq!(keeper.consecutive_vault_mismatches(), 3);
    assert_eq!(keeper.health().snapshot().status, HealthState::Ok);

    ledger.state.lock().unwrap().reward_vault = VAULT;
    keeper.tick_at(T0 + 600).await;
    assert_eq!(keeper.consecutive_vault_mismatches(), 0);
}

#[tokio::test]
async fn thin_vault_holds() {
    // vault 1_000_000 < 2 * default amount
    let ledger = MockLedger::new(state(), 1_000_000);
    let keeper = keeper(ledger.clone(), false);

    assert_eq!(
        keeper.tick_at(T0 + 61).await,
        TickOutcome::Skipped(SkipCause::Clamp(SkipReason::Hold))
    );
    assert!(ledger.submissions().is_empty());
}

#[tokio::test]
async fn full_window_holds_until_it_expires() {
    let mut s = state();
    s.distributed_this_window = 99_500_000;
    let ledger = MockLedger::new(s, 10_000_000);
    let keeper = keeper(ledger.clone(), false);

    assert_eq!(
        keeper.tick_at(T0 + 3_600).await,
        TickOutcome::Skipped(SkipCause::Clamp(SkipReason::Hold))
    );

    // a day after window start the ledger resets the window on update
    let outcome = keeper.tick_at(T0 + 86_400).await;
    assert!(matches!(
        outcome,
        TickOutcome::Submitted {
            amount: 1_000_000,
            ..
        }
    ));
}

#[tokio::test]
async fn read_failure_ends_tick_without_health_impact() {
    let ledger = MockLedger::new(state(), 50_000_000);
    ledger.fail_reads.store(true, Ordering::SeqCst);
    let keeper = keeper(ledger.clone(), false);

    for _ in 0..5 {
        assert!(matches!(
            keeper.tick_at(T0 + 600).await,
            TickOutcome::ReadFailed(_)
        ));
    }
    assert!(ledger.submissions().is_empty());
    assert_eq!(keeper.health().snapshot().consecutive_failures, 0);
    assert_eq!(keeper.consecutive_read_failures(), 5);

    ledger.fail_reads.store(false, Ordering::SeqCst);
    keeper.tick_at(T0 + 600).await;
    assert_eq!(keeper.consecutive_read_failures(), 0);
}

#[tokio::test]
async fn dry_run_passes_flag_and_counts_as_success() {
    let ledger = MockLedger::new(state(), 50_000_000);
    let keeper = keeper(ledger.clone(), true);

    assert_eq!(
        keeper.tick_at(T0 + 61).await,
        TickOutcome::Submitted {
            amount: 1_000_000,
            receipt: None,
        }
    );
    assert!(ledger.submissions()[0].dry_run);
    let health = keeper.health().snapshot();
    assert!(health.dry_run);
    assert_eq!(health.total_successes, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_invisible_to_health() {
    let ledger = MockLedger::new(state(), 50_000_000);
    ledger.failures_left.store(2, Ordering::SeqCst);
    let keeper = keeper(ledger.clone(), false);

    let outcome = keeper.tick_at(T0 + 61).await;
    assert!(matches!(outcome, TickOutcome::Submitted { .. }));
    assert_eq!(ledger.submissions().len(), 3);

    let health = keeper.health().snapshot();
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.total_successes, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_tick_with_linear_backoff() {
    let ledger = MockLedger::new(state(), 50_000_000);
    ledger.failures_left.store(u32::MAX, Ordering::SeqCst);
    let keeper = keeper(ledger.clone(), false);

    let outcome = keeper.tick_at(T0 + 61).await;
    assert!(matches!(outcome, TickOutcome::Failed(_)));

    let subs = ledger.submissions();
    assert_eq!(subs.len(), 3);
    assert_eq!(subs[1].at - subs[0].at, Duration::from_secs(5));
    assert_eq!(subs[2].at - subs[1].at, Duration::from_secs(10));
    assert_eq!(keeper.health().snapshot().consecutive_failures, 1);

    keeper.tick_at(T0 + 121).await;
    keeper.tick_at(T0 + 181).await;
    assert_eq!(keeper.health().snapshot().status, HealthState::Degraded);

    ledger.failures_left.store(0, Ordering::SeqCst);
    keeper.tick_at(T0 + 241).await;
    let health = keeper.health().snapshot();
    assert_eq!(health.status, HealthState::Ok);
    assert_eq!(health.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn run_ticks_immediately_then_every_period_and_stops_on_shutdown() {
    let ledger = MockLedger::new(stale_state(), 50_000_000);
    let keeper = Arc::new(keeper(ledger.clone(), false));
    let (tx, rx) = watch::channel(false);

    let runner = {
        let keeper = keeper.clone();
        tokio::spawn(async move { keeper.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ledger.submissions().len(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ledger.submissions().len(), 2);

    tx.send(true).unwrap();
    runner.await.unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(ledger.submissions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_retries_lets_the_tick_finish() {
    let ledger = MockLedger::new(stale_state(), 50_000_000);
    ledger.failures_left.store(u32::MAX, Ordering::SeqCst);
    let keeper = Arc::new(keeper(ledger.clone(), false));
    let (tx, rx) = watch::channel(false);

    let runner = {
        let keeper = keeper.clone();
        tokio::spawn(async move { keeper.run(rx).await })
    };

    // first attempt has failed, the retry sleep is pending
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ledger.submissions().len(), 1);

    tx.send(true).unwrap();
    runner.await.unwrap();

    assert_eq!(ledger.submissions().len(), 3);
    let health = keeper.health().snapshot();
    assert_eq!(health.consecutive_failures, 1);
    assert_eq!(health.total_successes, 0);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(ledger.submissions().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_submission_never_overlaps_the_next_tick() {
    let delay = Duration::from_secs(150);
    let ledger = MockLedger::with_submit_delay(stale_state(), 50_000_000, delay);
    let keeper = Arc::new(keeper(ledger.clone(), false));
    let (tx, rx) = watch::channel(false);

    let runner = {
        let keeper = keeper.clone();
        tokio::spawn(async move { keeper.run(rx).await })
    };

    // lands in the middle of a submission
    tokio::time::sleep(Duration::from_secs(400)).await;
    tx.send(true).unwrap();
    runner.await.unwrap();

    assert_eq!(ledger.max_inflight.load(Ordering::SeqCst), 1);

    let subs = ledger.submissions();
    assert!(subs.len() >= 2, "only {} submissions", subs.len());
    for pair in subs.windows(2) {
        assert!(pair[1].at - pair[0].at >= delay);
    }
    assert_eq!(keeper.health().snapshot().total_successes, subs.len() as u64);
}
