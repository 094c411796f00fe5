//! Solana wire format for bundler payments.
//!
//! Addresses, legacy message compilation, Ed25519 signing and the signed
//! transaction layout are implemented by hand on top of `ed25519-dalek` and
//! `bs58`, so the payment backend does not need `solana-sdk`.

pub mod address;
pub mod error;
pub mod message;
pub mod signing;

pub use address::{decode_address, decode_transfer_destination, encode_address, owner_to_address};
pub use error::SolError;
pub use message::{
    build_transfer_message, decode_compact_u16, encode_compact_u16, system_transfer,
    AccountMeta, CompiledInstruction, Instruction, Message, SYSTEM_PROGRAM_ID,
};
pub use signing::{
    public_key_from_seed, sign_bytes, sign_message, verify_signature, SignedTransaction,
};
