use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use solana_program::pubkey::Pubkey;

use super::transaction::SIGNATURE_LEN;

/// The keeper's signing key. Never leaves the process; the advisor has no
/// access to it.
#[derive(Clone)]
pub struct KeeperKeypair {
    signing: SigningKey,
    pubkey: Pubkey,
}

impl std::fmt::Debug for KeeperKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeeperKeypair")
            .field("pubkey", &self.pubkey)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl KeeperKeypair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let pubkey = Pubkey::new_from_array(signing.verifying_key().to_bytes());
        Self { signing, pubkey }
    }

    /// Accepts a 64-byte `secret ‖ public` keypair (the embedded public key
    /// must match) or a bare 32-byte seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            64 => {
                let arr: [u8; 64] = bytes
                    .try_into()
                    .map_err(|_| anyhow!("keypair must be 64 bytes"))?;
                let signing = SigningKey::from_keypair_bytes(&arr)
                    .map_err(|e| anyhow!("public half does not match secret: {e}"))?;
                let pubkey = Pubkey::new_from_array(signing.verifying_key().to_bytes());
                Ok(Self { signing, pubkey })
            }
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                Ok(Self::from_seed(seed))
            }
            n => bail!("keypair must be 32 or 64 bytes, got {n}"),
        }
    }

    /// Parse the `KEEPER_PRIVATE_KEY` formats: base58, or a JSON byte array
    /// as written by `solana-keygen`.
    pub fn from_secret_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("keeper secret is empty");
        }

        if raw.starts_with('[') {
            let bytes: Vec<u8> =
                serde_json::from_str(raw).context("keeper secret is not a JSON byte array")?;
            return Self::from_bytes(&bytes);
        }

        let bytes = bs58::decode(raw)
            .into_vec()
            .context("keeper secret is neither base58 nor a JSON byte array")?;
        Self::from_bytes(&bytes)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keypair file {}", path.display()))?;
        Self::from_secret_str(&raw)
            .with_context(|| format!("invalid keypair file {}", path.display()))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }

    #[cfg(test)]
    fn keypair_bytes(&self) -> [u8; 64] {
        self.signing.to_keypair_bytes()
    }
}
