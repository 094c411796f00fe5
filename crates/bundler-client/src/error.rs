use chain_sol::SolError;
use thiserror::Error;

use crate::rpc::RpcError;

/// Errors surfaced by token backends.
///
/// Transient rebroadcast failures never show up here; they are logged
/// inside the submission loop. Only terminal outcomes propagate.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("transaction {signature} failed on chain: {reason}")]
    TransactionFailed { signature: String, reason: String },

    /// The blockhash expired before the transaction resolved. The transfer
    /// has to be rebuilt from `create_transaction`.
    #[error("blockhash expired at height {last_valid_block_height} before {signature} resolved")]
    FreshnessExpired {
        signature: String,
        last_valid_block_height: u64,
        last_error: Option<String>,
    },

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("unable to resolve transaction {0}")]
    UnresolvedMeta(String),

    #[error("confirmation wait aborted: {0}")]
    ConfirmationAborted(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl From<SolError> for TokenError {
    fn from(e: SolError) -> Self {
        match e {
            SolError::InvalidAddress(msg) => TokenError::InvalidAddress(msg),
            SolError::MessageBuild(msg) => TokenError::InvalidAmount(msg),
            SolError::InvalidSecretKey(msg) | SolError::Signing(msg) => {
                TokenError::SigningFailed(msg)
            }
            other => TokenError::SubmissionFailed(other.to_string()),
        }
    }
}

pub type TokenResult<T> = Result<T, TokenError>;
