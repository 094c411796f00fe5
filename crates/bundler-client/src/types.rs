//! Shared payment types.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use chain_sol::Message;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Confirmation depth requested when querying chain state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(TokenError::Config(format!("unknown commitment: {other}"))),
        }
    }
}

/// A recent blockhash and the last block height at which transactions built
/// on it can still land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blockhash {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

impl Blockhash {
    /// Whether a transaction built on this blockhash can still land at
    /// `block_height`.
    pub fn is_valid_at(&self, block_height: u64) -> bool {
        block_height < self.last_valid_block_height
    }
}

/// Terminal result of waiting on a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Reached the requested commitment. `err` is the on-chain execution
    /// error, if the transaction ran and failed.
    Confirmed { slot: u64, err: Option<String> },
    /// Block height passed the blockhash's last valid height first.
    Expired,
}

/// What the caller wants to pay, in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub amount: U256,
    pub to: String,
    /// Explicit fee. Solana derives fees from the signature count, so this
    /// is carried for the caller's bookkeeping only.
    pub fee: Option<U256>,
}

impl TransferIntent {
    pub fn new(amount: impl Into<U256>, to: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            to: to.into(),
            fee: None,
        }
    }

    pub fn with_fee(mut self, fee: impl Into<U256>) -> Self {
        self.fee = Some(fee.into());
        self
    }
}

/// A compiled transfer bound to the blockhash it was built against.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub message: Message,
    pub blockhash: Blockhash,
    pub intent: TransferIntent,
}

/// A finalized transfer as seen from the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    pub from: String,
    pub to: String,
    /// Signed balance change of the destination, in base units.
    pub amount: i128,
    pub block_height: u64,
    pub pending: bool,
    pub confirmed: bool,
}
