//! Ledger boundary: account reads and the `update_index` write.

pub mod accounts;
pub mod error;
pub mod keypair;
pub mod rpc;
pub mod solana;
pub mod transaction;

use anyhow::Result;

use crate::models::{GlobalAccrualState, Receipt, SubmitContext};

pub use error::{LedgerError, ProgramRejection};
pub use keypair::KeeperKeypair;
pub use solana_program::pubkey::Pubkey;
pub use solana::{ConfirmSettings, SolanaLedgerClient};

/// What the reconciliation loop needs from the ledger.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    async fn read_global_state(&self) -> Result<GlobalAccrualState>;

    async fn read_balance(&self, account: &Pubkey) -> Result<u64>;

    /// Advance the index by `amount`. With `dry_run` nothing is sent and the
    /// result is `Ok(None)`; otherwise the receipt of the confirmed transaction.
    async fn submit_distribution(
        &self,
        amount: u64,
        ctx: &SubmitContext,
        dry_run: bool,
    ) -> Result<Option<Receipt>>;
}
