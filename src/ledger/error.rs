use std::fmt;

use solana_program::pubkey::Pubkey;
use thiserror::Error;

/// Anchor numbers custom program errors from this offset.
const ANCHOR_ERROR_OFFSET: u32 = 6000;

/// Errors surfaced by the ledger boundary.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("program rejected instruction: {0}")]
    Rejected(ProgramRejection),

    #[error("transaction {signature} failed: {detail}")]
    TransactionFailed { signature: String, detail: String },

    #[error("transaction {0} not confirmed before deadline")]
    Unconfirmed(String),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("failed to decode {what}: {detail}")]
    Decode { what: &'static str, detail: String },
}

impl LedgerError {
    pub(crate) fn decode(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Decode {
            what,
            detail: detail.into(),
        }
    }
}

/// Named rejection reasons of the accrual program, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramRejection {
    Paused,
    NotAdmin,
    NotKeeper,
    TooEarly,
    ExceedsMinuteCap,
    ExceedsDailyCap,
    NothingToClaim,
    MathOverflow,
    InsufficientVaultBalance,
    ZeroAmount,
    ZeroBalance,
    Other(u32),
}

impl ProgramRejection {
    pub fn from_code(code: u32) -> Self {
        match code.checked_sub(ANCHOR_ERROR_OFFSET) {
            Some(0) => Self::Paused,
            Some(1) => Self::NotAdmin,
            Some(2) => Self::NotKeeper,
            Some(3) => Self::TooEarly,
            Some(4) => Self::ExceedsMinuteCap,
            Some(5) => Self::ExceedsDailyCap,
            Some(6) => Self::NothingToClaim,
            Some(7) => Self::MathOverflow,
            Some(8) => Self::InsufficientVaultBalance,
            Some(9) => Self::ZeroAmount,
            Some(10) => Self::ZeroBalance,
            _ => Self::Other(code),
        }
    }

    /// Extract the code from a simulation log line such as
    /// `custom program error: 0x1773`.
    pub fn from_message(message: &str) -> Option<Self> {
        const NEEDLE: &str = "custom program error: 0x";
        let start = message.find(NEEDLE)? + NEEDLE.len();
        let hex: String = message[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        u32::from_str_radix(&hex, 16).ok().map(Self::from_code)
    }

    /// Extract the code from a transaction error object,
    /// e.g. `{"InstructionError":[0,{"Custom":6003}]}`.
    pub fn from_transaction_error(err: &serde_json::Value) -> Option<Self> {
        err.pointer("/InstructionError/1/Custom")
            .and_then(|c| c.as_u64())
            .and_then(|c| u32::try_from(c).ok())
            .map(Self::from_code)
    }
}

impl fmt::Display for ProgramRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paused => f.write_str("program is paused"),
            Self::NotAdmin => f.write_str("caller is not admin"),
            Self::NotKeeper => f.write_str("caller is not keeper or admin"),
            Self::TooEarly => f.write_str("update interval not elapsed"),
            Self::ExceedsMinuteCap => f.write_str("amount exceeds per-period cap"),
            Self::ExceedsDailyCap => f.write_str("amount exceeds window cap"),
            Self::NothingToClaim => f.write_str("nothing to claim"),
            Self::MathOverflow => f.write_str("arithmetic overflow"),
            Self::InsufficientVaultBalance => f.write_str("vault has insufficient funds"),
            Self::ZeroAmount => f.write_str("amount must be greater than zero"),
            Self::ZeroBalance => f.write_str("share supply is zero"),
            Self::Other(code) => write!(f, "custom program error {code}"),
        }
    }
}
