//! Account layouts of the accrual program.
//!
//! Anchor accounts start with an 8-byte discriminator (`sha256("account:<Name>")`)
//! followed by the fields in declaration order, little-endian. Instructions are
//! prefixed the same way with `sha256("global:<name>")`.

use sha2::{Digest, Sha256};
use solana_program::pubkey::{Pubkey, PUBKEY_BYTES};

use super::error::LedgerError;
use crate::models::{GlobalAccrualState, UserAccrualState};

pub const DISCRIMINATOR_LEN: usize = 8;

pub const GLOBAL_STATE_SEED: &[u8] = b"global_state";
pub const REWARD_VAULT_SEED: &[u8] = b"reward_vault";
pub const USER_STATE_SEED: &[u8] = b"user_state";

pub const GLOBAL_STATE_LEN: usize = DISCRIMINATOR_LEN
    + 32 // admin
    + 32 // keeper
    + 1 // paused
    + 8 // last_update_ts
    + 16 // global_reward_index
    + 32 // usdc_mint
    + 32 // reward_vault
    + 8 // max_per_minute
    + 8 // max_per_day
    + 8 // daily_distributed
    + 8 // day_start_ts
    + 1; // bump

pub const USER_STATE_LEN: usize = DISCRIMINATOR_LEN + 32 + 16 + 8 + 1;

/// SPL mint: `supply` follows the 36-byte optional mint authority.
const MINT_SUPPLY_OFFSET: usize = 36;
const MINT_MIN_LEN: usize = 82;

fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account", name)
}

pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    discriminator("global", name)
}

/// `update_index(amount_usdc: u64)` instruction payload.
pub fn update_index_data(amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(DISCRIMINATOR_LEN + 8);
    data.extend_from_slice(&instruction_discriminator("update_index"));
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

struct Reader<'a> {
    input: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8], what: &'static str) -> Self {
        Self { input, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LedgerError> {
        if self.input.len() < n {
            return Err(LedgerError::decode(
                self.what,
                format!("truncated: need {n} more bytes, have {}", self.input.len()),
            ));
        }
        let (head, rest) = self.input.split_at(n);
        self.input = rest;
        Ok(head)
    }

    fn expect_discriminator(&mut self, name: &str) -> Result<(), LedgerError> {
        let got = self.take(DISCRIMINATOR_LEN)?;
        if got != account_discriminator(name) {
            return Err(LedgerError::decode(
                self.what,
                format!("discriminator mismatch for {name}"),
            ));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, LedgerError> {
        Ok(self.take(1)?[0])
    }

    fn read_bool(&mut self) -> Result<bool, LedgerError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LedgerError::decode(
                self.what,
                format!("invalid bool byte {other}"),
            )),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], LedgerError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u64(&mut self) -> Result<u64, LedgerError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, LedgerError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_u128(&mut self) -> Result<u128, LedgerError> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    fn read_pubkey(&mut self) -> Result<Pubkey, LedgerError> {
        Ok(Pubkey::new_from_array(self.read_array::<PUBKEY_BYTES>()?))
    }
}

pub fn decode_global_state(data: &[u8]) -> Result<GlobalAccrualState, LedgerError> {
    let mut r = Reader::new(data, "GlobalState");
    r.expect_discriminator("GlobalState")?;
    Ok(GlobalAccrualState {
        admin: r.read_pubkey()?,
        keeper: r.read_pubkey()?,
        paused: r.read_bool()?,
        last_update_ts: r.read_i64()?,
        global_index: r.read_u128()?,
        reward_mint: r.read_pubkey()?,
        reward_vault: r.read_pubkey()?,
        max_per_period: r.read_u64()?,
        max_per_window: r.read_u64()?,
        distributed_this_window: r.read_u64()?,
        window_start_ts: r.read_i64()?,
        bump: r.read_u8()?,
    })
}

pub fn decode_user_state(data: &[u8]) -> Result<UserAccrualState, LedgerError> {
    let mut r = Reader::new(data, "UserState");
    r.expect_discriminator("UserState")?;
    Ok(UserAccrualState {
        owner: r.read_pubkey()?,
        user_index: r.read_u128()?,
        pending_rewards: r.read_u64()?,
        bump: r.read_u8()?,
    })
}

pub fn decode_mint_supply(data: &[u8]) -> Result<u64, LedgerError> {
    if data.len() < MINT_MIN_LEN {
        return Err(LedgerError::decode(
            "Mint",
            format!("expected at least {MINT_MIN_LEN} bytes, got {}", data.len()),
        ));
    }
    let mut r = Reader::new(&data[MINT_SUPPLY_OFFSET..], "Mint");
    r.read_u64()
}

/// Serialize a global state the way the program stores it. Used to build
/// fixtures for RPC-level tests.
pub fn encode_global_state(state: &GlobalAccrualState) -> Vec<u8> {
    let mut out = Vec::with_capacity(GLOBAL_STATE_LEN);
    out.extend_from_slice(&account_discriminator("GlobalState"));
    out.extend_from_slice(state.admin.as_ref());
    out.extend_from_slice(state.keeper.as_ref());
    out.push(u8::from(state.paused));
    out.extend_from_slice(&state.last_update_ts.to_le_bytes());
    out.extend_from_slice(&state.global_index.to_le_bytes());
    out.extend_from_slice(state.reward_mint.as_ref());
    out.extend_from_slice(state.reward_vault.as_ref());
    out.extend_from_slice(&state.max_per_period.to_le_bytes());
    out.extend_from_slice(&state.max_per_window.to_le_bytes());
    out.extend_from_slice(&state.distributed_this_window.to_le_bytes());
    out.extend_from_slice(&state.window_start_ts.to_le_bytes());
    out.push(state.bump);
    out
}

pub fn encode_user_state(state: &UserAccrualState) -> Vec<u8> {
    let mut out = Vec::with_capacity(USER_STATE_LEN);
    out.extend_from_slice(&account_discriminator("UserState"));
    out.extend_from_slice(state.owner.as_ref());
    out.extend_from_slice(&state.user_index.to_le_bytes());
    out.extend_from_slice(&state.pending_rewards.to_le_bytes());
    out.push(state.bump);
    out
}
