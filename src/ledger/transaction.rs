//! Signing and wire encoding for single-signer legacy transactions.
//!
//! Wire layout: `compact_u16(1) ‖ signature[64] ‖ message`. The message bytes
//! come from `solana_program`'s legacy `Message`.

use anyhow::{ensure, Result};
use solana_program::message::Message;

use super::keypair::KeeperKeypair;

pub const SIGNATURE_LEN: usize = 64;

/// compact-u16 of a count below 0x80 is the count itself.
const ONE_SIGNATURE: u8 = 1;

/// A transaction signed by the keeper alone.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub signature: [u8; SIGNATURE_LEN],
    pub wire: Vec<u8>,
}

impl SignedTransaction {
    pub fn sign(message: &Message, signer: &KeeperKeypair) -> Result<Self> {
        ensure!(
            message.header.num_required_signatures == 1,
            "expected exactly one signer, message requires {}",
            message.header.num_required_signatures
        );
        ensure!(
            message.account_keys.first() == Some(&signer.pubkey()),
            "fee payer does not match signing key"
        );

        let message_bytes = message.serialize();
        let signature = signer.sign(&message_bytes);

        let mut wire = Vec::with_capacity(1 + SIGNATURE_LEN + message_bytes.len());
        wire.push(ONE_SIGNATURE);
        wire.extend_from_slice(&signature);
        wire.extend_from_slice(&message_bytes);

        Ok(Self { signature, wire })
    }

    /// Base58 signature, which is also the transaction id.
    pub fn id(&self) -> String {
        bs58::encode(self.signature).into_string()
    }
}
