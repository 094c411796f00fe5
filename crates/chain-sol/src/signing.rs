//! Ed25519 signing and the signed transaction wire format.
//!
//! ```text
//! Transaction:
//!   num_signatures   compact-u16
//!   signatures       64 bytes * num_signatures
//!   message          (see `message`)
//! ```
//!
//! A transaction's id is the Base58 encoding of its first signature, which
//! is the fee payer's.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use zeroize::Zeroize;

use crate::error::SolError;
use crate::message::{decode_compact_u16, encode_compact_u16, Message};

/// Serialized, signed transaction bytes.
///
/// Rebroadcasting the same value is safe: the cluster deduplicates on the
/// signature, so a payload can only execute once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    wire: Vec<u8>,
    first_signature_at: usize,
}

impl SignedTransaction {
    /// Wrap wire bytes, checking that at least one full signature is present.
    pub fn from_wire(wire: Vec<u8>) -> Result<Self, SolError> {
        let (count, prefix) = decode_compact_u16(&wire)?;
        if count == 0 {
            return Err(SolError::MalformedWire("zero signatures".into()));
        }
        if wire.len() < prefix + 64 * count as usize {
            return Err(SolError::MalformedWire(
                "signature slots exceed transaction length".into(),
            ));
        }
        Ok(Self {
            wire,
            first_signature_at: prefix,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.wire
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.wire
    }

    /// Base58 id of the transaction (the first signature).
    pub fn signature(&self) -> String {
        let start = self.first_signature_at;
        bs58::encode(&self.wire[start..start + 64]).into_string()
    }
}

/// Derive the 32-byte public key of an Ed25519 seed.
pub fn public_key_from_seed(seed: &[u8; 32]) -> [u8; 32] {
    let mut tmp = *seed;
    let key = SigningKey::from_bytes(&tmp);
    tmp.zeroize();
    key.verifying_key().to_bytes()
}

/// Detached signature over arbitrary bytes.
pub fn sign_bytes(seed: &[u8; 32], data: &[u8]) -> [u8; 64] {
    let mut tmp = *seed;
    let key = SigningKey::from_bytes(&tmp);
    tmp.zeroize();
    key.sign(data).to_bytes()
}

/// Sign `message` with the fee payer's seed and assemble the wire bytes.
///
/// Only single-signer messages are supported, and the seed must belong to
/// the fee payer.
pub fn sign_message(message: &Message, seed: &[u8; 32]) -> Result<SignedTransaction, SolError> {
    if message.num_required_signatures != 1 {
        return Err(SolError::Signing(format!(
            "expected 1 required signature, message has {}",
            message.num_required_signatures
        )));
    }
    let payer = message
        .fee_payer()
        .ok_or_else(|| SolError::Signing("message has no fee payer".into()))?;
    if *payer != public_key_from_seed(seed) {
        return Err(SolError::Signing(
            "secret key does not match the fee payer".into(),
        ));
    }

    let message_bytes = message.serialize();
    let signature = sign_bytes(seed, &message_bytes);

    let mut wire = Vec::with_capacity(1 + 64 + message_bytes.len());
    wire.extend_from_slice(&encode_compact_u16(1));
    wire.extend_from_slice(&signature);
    wire.extend_from_slice(&message_bytes);
    SignedTransaction::from_wire(wire)
}

/// Strict Ed25519 verification of a detached signature.
///
/// Malformed signatures verify as `false`; a key that is not a valid curve
/// point is an error.
pub fn verify_signature(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, SolError> {
    let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
        SolError::InvalidAddress(format!("expected 32-byte public key, got {}", public_key.len()))
    })?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| SolError::InvalidAddress(format!("public key is not on curve: {e}")))?;
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return Ok(false);
    };
    Ok(key.verify_strict(data, &Signature::from_bytes(&sig_bytes)).is_ok())
}
