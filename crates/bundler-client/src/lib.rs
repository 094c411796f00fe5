//! Payment client for bundler networks.
//!
//! A [`Token`] is the backend for one currency, picked from a
//! [`TokenConfig`]. It funds the bundler by building a native transfer,
//! submitting it, and following it to a terminal state.
//!
//! Only Solana is implemented; see [`solana`] for the submission and
//! confirmation protocol.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod retry;
pub mod rpc;
pub mod signer;
pub mod solana;
pub mod types;

pub use backend::TokenBackend;
pub use config::TokenConfig;
pub use error::{TokenError, TokenResult};
pub use registry::{Currency, PreparedTransaction, Token};
pub use rpc::{ConfirmedTransaction, HttpRpcClient, RpcError, SolanaRpc, TransactionMeta};
pub use signer::{KeypairSigner, TransactionSigner};
pub use solana::SolanaToken;
pub use types::{Blockhash, Commitment, ConfirmationStatus, TransferIntent, Tx, UnsignedTransaction};

pub use alloy_primitives::U256;
