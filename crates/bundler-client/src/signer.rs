//! Signing oracle.
//!
//! Backends never hold key material directly; they ask a
//! [`TransactionSigner`] for the payer key and for signatures. A browser
//! wallet adapter or hardware signer implements the same trait.

use async_trait::async_trait;
use chain_sol::{Message, SignedTransaction, SolError};
use ed25519_dalek::SigningKey;
use secrecy::{ExposeSecret, SecretBox};
use zeroize::Zeroize;

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The payer's raw Ed25519 public key.
    fn public_key(&self) -> Result<[u8; 32], SolError>;

    /// Sign a compiled message as its fee payer.
    async fn sign_transaction(&self, message: &Message) -> Result<SignedTransaction, SolError>;

    /// Detached signature over arbitrary bytes.
    async fn sign_message(&self, data: &[u8]) -> Result<[u8; 64], SolError>;
}

/// In-process signer over an Ed25519 seed.
pub struct KeypairSigner {
    seed: SecretBox<[u8; 32]>,
    public_key: [u8; 32],
}

impl KeypairSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let public_key = chain_sol::public_key_from_seed(&seed);
        Self {
            seed: SecretBox::new(Box::new(seed)),
            public_key,
        }
    }

    /// Accepts a 32-byte seed or the 64-byte `seed || public key` layout
    /// used by Solana keypair files. The trailing half must match the seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SolError> {
        let mut seed: [u8; 32] = bytes
            .get(..32)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| SolError::InvalidSecretKey(format!("expected 32 or 64 bytes, got {}", bytes.len())))?;

        let signer = match bytes.len() {
            32 => Self::from_seed(seed),
            64 => {
                let signer = Self::from_seed(seed);
                if bytes[32..] != signer.public_key {
                    seed.zeroize();
                    return Err(SolError::InvalidSecretKey(
                        "public key half does not match the seed".into(),
                    ));
                }
                signer
            }
            n => {
                seed.zeroize();
                return Err(SolError::InvalidSecretKey(format!(
                    "expected 32 or 64 bytes, got {n}"
                )));
            }
        };
        seed.zeroize();
        Ok(signer)
    }

    /// Base58-encoded secret, as exported by most Solana wallets.
    pub fn from_base58(secret: &str) -> Result<Self, SolError> {
        let mut bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| SolError::InvalidSecretKey(format!("base58 decode failed: {e}")))?;
        let signer = Self::from_bytes(&bytes);
        bytes.zeroize();
        signer
    }

    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::from_seed(key.to_bytes())
    }

    pub fn address(&self) -> String {
        chain_sol::encode_address(&self.public_key)
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn public_key(&self) -> Result<[u8; 32], SolError> {
        Ok(self.public_key)
    }

    async fn sign_transaction(&self, message: &Message) -> Result<SignedTransaction, SolError> {
        chain_sol::sign_message(message, self.seed.expose_secret())
    }

    async fn sign_message(&self, data: &[u8]) -> Result<[u8; 64], SolError> {
        Ok(chain_sol::sign_bytes(self.seed.expose_secret(), data))
    }
}
