use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_program::message::Message;
use solana_program::pubkey::Pubkey;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::accounts::{
    decode_global_state, decode_mint_supply, decode_user_state, update_index_data,
    GLOBAL_STATE_SEED, REWARD_VAULT_SEED, USER_STATE_SEED,
};
use super::error::{LedgerError, ProgramRejection};
use super::keypair::KeeperKeypair;
use super::rpc::RpcClient;
use super::transaction::SignedTransaction;
use super::LedgerClient;
use crate::accrual::index_delta;
use crate::models::{GlobalAccrualState, Receipt, SubmitContext, UserAccrualState};

/// How long to wait for a submitted transaction to reach `confirmed`.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Ledger client for the accrual program on a Solana cluster.
#[derive(Debug)]
pub struct SolanaLedgerClient {
    rpc: RpcClient,
    keeper: Option<KeeperKeypair>,
    program_id: Pubkey,
    share_mint: Pubkey,
    global_state: Pubkey,
    reward_vault: Pubkey,
    confirm: ConfirmSettings,
}

impl SolanaLedgerClient {
    /// Client able to submit `update_index` as `keeper`.
    pub fn new(
        rpc: RpcClient,
        keeper: KeeperKeypair,
        program_id: Pubkey,
        share_mint: Pubkey,
    ) -> Result<Self> {
        let mut client = Self::read_only(rpc, program_id, share_mint)?;
        client.keeper = Some(keeper);
        Ok(client)
    }

    /// Client without a signing key; submissions fail.
    pub fn read_only(rpc: RpcClient, program_id: Pubkey, share_mint: Pubkey) -> Result<Self> {
        let (global_state, _) = Pubkey::try_find_program_address(&[GLOBAL_STATE_SEED], &program_id)
            .ok_or_else(|| anyhow!("no global state address for program {program_id}"))?;
        let (reward_vault, _) = Pubkey::try_find_program_address(&[REWARD_VAULT_SEED], &program_id)
            .ok_or_else(|| anyhow!("no reward vault address for program {program_id}"))?;

        Ok(Self {
            rpc,
            keeper: None,
            program_id,
            share_mint,
            global_state,
            reward_vault,
            confirm: ConfirmSettings::default(),
        })
    }

    pub fn with_confirm_settings(mut self, confirm: ConfirmSettings) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn global_state_address(&self) -> Pubkey {
        self.global_state
    }

    pub fn reward_vault(&self) -> Pubkey {
        self.reward_vault
    }

    pub fn share_mint(&self) -> Pubkey {
        self.share_mint
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc.url()
    }

    pub fn user_state_address(&self, owner: &Pubkey) -> Option<Pubkey> {
        Pubkey::try_find_program_address(&[USER_STATE_SEED, owner.as_ref()], &self.program_id)
            .map(|(address, _)| address)
    }

    /// Per-participant account, or `None` if the owner never initialized one.
    pub async fn read_user_state(&self, owner: &Pubkey) -> Result<Option<UserAccrualState>> {
        let address = self
            .user_state_address(owner)
            .ok_or_else(|| anyhow!("no user state address for {owner}"))?;
        let Some(data) = self.rpc.get_account_data(&address).await? else {
            return Ok(None);
        };
        Ok(Some(decode_user_state(&data)?))
    }

    /// Total share-mint balance across the owner's token accounts.
    pub async fn read_share_balance(&self, owner: &Pubkey) -> Result<u64> {
        Ok(self
            .rpc
            .get_token_balance_by_owner(owner, &self.share_mint)
            .await?)
    }

    pub async fn read_share_supply(&self) -> Result<u64> {
        let data = self
            .rpc
            .get_account_data(&self.share_mint)
            .await?
            .ok_or(LedgerError::AccountNotFound(self.share_mint))?;
        Ok(decode_mint_supply(&data)?)
    }

    pub fn update_index_instruction(&self, caller: Pubkey, amount: u64) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new_readonly(caller, true),
                AccountMeta::new(self.global_state, false),
                AccountMeta::new_readonly(self.share_mint, false),
            ],
            data: update_index_data(amount),
        }
    }

    async fn log_dry_run(&self, amount: u64, ctx: &SubmitContext) {
        let projected = match self.read_share_supply().await {
            Ok(supply) => index_delta(amount, supply),
            Err(e) => {
                debug!(error = %e, "share supply unavailable for dry-run projection");
                None
            }
        };
        info!(
            tick_id = ctx.tick_id,
            amount,
            source = ctx.source.as_str(),
            projected_index_delta = ?projected,
            "[DRY RUN] would call update_index"
        );
    }

    async fn await_confirmation(&self, signature: &str) -> Result<(), LedgerError> {
        let deadline = Instant::now() + self.confirm.timeout;
        loop {
            if let Some(status) = self.rpc.get_signature_status(signature).await? {
                if let Some(err) = status.err {
                    return Err(match ProgramRejection::from_transaction_error(&err) {
                        Some(rejection) => LedgerError::Rejected(rejection),
                        None => LedgerError::TransactionFailed {
                            signature: signature.to_string(),
                            detail: err.to_string(),
                        },
                    });
                }
                if status.is_confirmed() {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(LedgerError::Unconfirmed(signature.to_string()));
            }
            sleep(self.confirm.poll_interval).await;
        }
    }
}

#[async_trait::async_trait]
impl LedgerClient for SolanaLedgerClient {
    async fn read_global_state(&self) -> Result<GlobalAccrualState> {
        let data = self
            .rpc
            .get_account_data(&self.global_state)
            .await?
            .ok_or(LedgerError::AccountNotFound(self.global_state))?;
        Ok(decode_global_state(&data)?)
    }

    async fn read_balance(&self, account: &Pubkey) -> Result<u64> {
        self.rpc
            .get_token_account_balance(account)
            .await
            .with_context(|| format!("failed to read balance of {account}"))
    }

    async fn submit_distribution(
        &self,
        amount: u64,
        ctx: &SubmitContext,
        dry_run: bool,
    ) -> Result<Option<Receipt>> {
        if dry_run {
            self.log_dry_run(amount, ctx).await;
            return Ok(None);
        }

        let Some(keeper) = self.keeper.as_ref() else {
            bail!("ledger client has no keeper key; cannot submit");
        };

        let ix = self.update_index_instruction(keeper.pubkey(), amount);
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let message = Message::new_with_blockhash(&[ix], Some(&keeper.pubkey()), &blockhash);
        let tx = SignedTransaction::sign(&message, keeper)?;

        let signature = self.rpc.send_transaction(&tx.wire).await?;
        if signature != tx.id() {
            warn!(
                reported = %signature,
                local = %tx.id(),
                "node reported a different signature"
            );
        }
        debug!(tick_id = ctx.tick_id, %signature, "transaction sent, awaiting confirmation");

        self.await_confirmation(&signature).await?;
        Ok(Some(Receipt(signature)))
    }
}
