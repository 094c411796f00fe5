//! Solana address encoding and validation.
//!
//! A Solana address is the Base58 encoding of a raw 32-byte Ed25519 public
//! key (or of a program-derived address, which is off-curve but still 32
//! bytes). Recent blockhashes use the same encoding, so the decoder here is
//! shared by both.

use crate::error::SolError;
use crate::message::SYSTEM_PROGRAM_ID;

/// Encode 32 raw bytes as a Base58 address.
pub fn encode_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

/// Base58-encode arbitrary owner bytes.
///
/// Public keys handed over by wallet adapters are not always exactly 32
/// bytes long, so this does not enforce a length.
pub fn owner_to_address(owner: &[u8]) -> String {
    bs58::encode(owner).into_string()
}

/// Decode a Base58 string that must hold exactly 32 bytes.
pub fn decode_address(address: &str) -> Result<[u8; 32], SolError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })
}

/// Decode and check a native transfer destination.
///
/// On top of the format check, the System Program id is refused: lamports
/// sent there are unrecoverable, and it is what a zeroed or defaulted
/// address decodes to.
pub fn decode_transfer_destination(address: &str) -> Result<[u8; 32], SolError> {
    let bytes = decode_address(address)?;
    if bytes == SYSTEM_PROGRAM_ID {
        return Err(SolError::InvalidAddress(
            "destination is the System Program".into(),
        ));
    }
    Ok(bytes)
}
