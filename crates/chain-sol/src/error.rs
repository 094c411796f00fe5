use thiserror::Error;

/// Errors raised while encoding, signing or decoding Solana transactions.
#[derive(Debug, Error)]
pub enum SolError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("message build error: {0}")]
    MessageBuild(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("malformed wire transaction: {0}")]
    MalformedWire(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}
