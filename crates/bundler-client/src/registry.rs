//! Currency → backend selection.
//!
//! Each supported currency is one [`Currency`] variant and one [`Token`]
//! variant. Adding a chain means adding both and the match arms below;
//! shared submission logic is untouched.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::TokenBackend;
use crate::config::TokenConfig;
use crate::error::{TokenError, TokenResult};
use crate::signer::TransactionSigner;
use crate::solana::{SolanaToken, MIN_CONFIRMATIONS};
use crate::types::{TransferIntent, Tx, UnsignedTransaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Solana,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Solana => "solana",
        }
    }

    /// Name and decimals of the base unit.
    pub fn base_unit(&self) -> (&'static str, u32) {
        match self {
            Currency::Solana => ("lamports", 9),
        }
    }

    pub fn min_confirmations(&self) -> u64 {
        match self {
            Currency::Solana => MIN_CONFIRMATIONS,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(Currency::Solana),
            other => Err(TokenError::UnsupportedCurrency(other.to_string())),
        }
    }
}

/// A configured backend.
pub enum Token {
    Solana(SolanaToken),
}

/// An unsigned transaction from any backend.
#[derive(Debug, Clone)]
pub enum PreparedTransaction {
    Solana(UnsignedTransaction),
}

impl Token {
    /// Pick and build the backend for `config.currency`.
    pub fn from_config(config: TokenConfig, signer: Arc<dyn TransactionSigner>) -> TokenResult<Self> {
        match config.currency {
            Currency::Solana => Ok(Token::Solana(SolanaToken::new(config, signer)?)),
        }
    }

    pub fn currency(&self) -> Currency {
        match self {
            Token::Solana(_) => Currency::Solana,
        }
    }
}

#[async_trait]
impl TokenBackend for Token {
    type UnsignedTx = PreparedTransaction;

    async fn create_transaction(&self, intent: TransferIntent) -> TokenResult<PreparedTransaction> {
        match self {
            Token::Solana(t) => Ok(PreparedTransaction::Solana(t.create_transaction(intent).await?)),
        }
    }

    async fn send_transaction(&self, tx: PreparedTransaction) -> TokenResult<String> {
        match (self, tx) {
            (Token::Solana(t), PreparedTransaction::Solana(tx)) => t.send_transaction(tx).await,
        }
    }

    async fn get_transaction(&self, id: &str) -> TokenResult<Tx> {
        match self {
            Token::Solana(t) => t.get_transaction(id).await,
        }
    }

    async fn get_fee(&self, amount: U256, to: Option<&str>) -> TokenResult<U256> {
        match self {
            Token::Solana(t) => t.get_fee(amount, to).await,
        }
    }

    async fn get_current_height(&self) -> TokenResult<u64> {
        match self {
            Token::Solana(t) => t.get_current_height().await,
        }
    }

    fn public_key(&self) -> TokenResult<Vec<u8>> {
        match self {
            Token::Solana(t) => TokenBackend::public_key(t),
        }
    }

    fn owner_to_address(&self, owner: &[u8]) -> String {
        match self {
            Token::Solana(t) => t.owner_to_address(owner),
        }
    }

    async fn sign(&self, data: &[u8]) -> TokenResult<Vec<u8>> {
        match self {
            Token::Solana(t) => t.sign(data).await,
        }
    }

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> TokenResult<bool> {
        match self {
            Token::Solana(t) => t.verify(public_key, data, signature),
        }
    }
}
