//! Legacy Solana message layout.
//!
//! ```text
//! Message:
//!   num_required_sigs     u8
//!   num_readonly_signed   u8
//!   num_readonly_unsigned u8
//!   num_accounts          compact-u16
//!   account_keys          32 bytes * num_accounts
//!   recent_blockhash      32 bytes
//!   num_instructions      compact-u16
//!   instructions[]:
//!     program_id_index    u8
//!     num_accounts        compact-u16
//!     account_indices     u8 * num_accounts
//!     data_len            compact-u16
//!     data                u8 * data_len
//! ```
//!
//! The recent blockhash is the transaction's freshness token: the cluster
//! refuses the message once its block height passes the blockhash's last
//! valid height.

use crate::error::SolError;

/// The System Program id, 32 zero bytes (`11111111111111111111111111111111`).
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// `SystemInstruction::Transfer` discriminant (u32 LE).
const SYSTEM_TRANSFER_DISCRIMINANT: u32 = 2;

/// Encode a `u16` as Solana's compact-u16 (1 to 3 bytes, 7 bits per byte).
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut rem = value as u32;
    let mut out = Vec::with_capacity(3);
    loop {
        let low = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(low);
            return out;
        }
        out.push(low | 0x80);
    }
}

/// Decode a compact-u16 prefix, returning `(value, bytes_consumed)`.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    for (i, byte) in data.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| SolError::MalformedWire("compact-u16 overflow".into()));
        }
    }
    Err(SolError::MalformedWire(
        "truncated compact-u16 length prefix".into(),
    ))
}

/// An account referenced by an instruction, with its permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: [u8; 32],
    pub is_signer: bool,
    pub is_writable: bool,
}

/// An uncompiled instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub program_id: [u8; 32],
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// An instruction whose account references are indices into
/// [`Message::account_keys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// A compiled, unsigned message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Canonical order: writable signers (fee payer first), read-only
    /// signers, writable non-signers, read-only non-signers.
    pub account_keys: Vec<[u8; 32]>,
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile `instructions` for a single fee payer.
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &[u8; 32],
        recent_blockhash: &[u8; 32],
    ) -> Result<Self, SolError> {
        let mut metas: Vec<AccountMeta> = Vec::new();
        let mut merge = |meta: AccountMeta| {
            match metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
                Some(existing) => {
                    existing.is_signer |= meta.is_signer;
                    existing.is_writable |= meta.is_writable;
                }
                None => metas.push(meta),
            }
        };

        merge(AccountMeta {
            pubkey: *fee_payer,
            is_signer: true,
            is_writable: true,
        });
        for ix in instructions {
            for meta in &ix.accounts {
                merge(meta.clone());
            }
            merge(AccountMeta {
                pubkey: ix.program_id,
                is_signer: false,
                is_writable: false,
            });
        }

        // Stable sort keeps insertion order inside each class, so the fee
        // payer stays at index 0.
        metas.sort_by_key(|m| match (m.is_signer, m.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        if metas.len() > u8::MAX as usize {
            return Err(SolError::MessageBuild(format!(
                "too many accounts: {}",
                metas.len()
            )));
        }

        let account_keys: Vec<[u8; 32]> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &[u8; 32]| -> Result<u8, SolError> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| SolError::MessageBuild("account missing from key list".into()))
        };

        let compiled = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    account_indices: ix
                        .accounts
                        .iter()
                        .map(|m| index_of(&m.pubkey))
                        .collect::<Result<_, SolError>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>, SolError>>()?;

        Ok(Self {
            num_required_signatures: metas.iter().filter(|m| m.is_signer).count() as u8,
            num_readonly_signed: metas
                .iter()
                .filter(|m| m.is_signer && !m.is_writable)
                .count() as u8,
            num_readonly_unsigned: metas
                .iter()
                .filter(|m| !m.is_signer && !m.is_writable)
                .count() as u8,
            account_keys,
            recent_blockhash: *recent_blockhash,
            instructions: compiled,
        })
    }

    /// The fee payer, always the first account key.
    pub fn fee_payer(&self) -> Option<&[u8; 32]> {
        self.account_keys.first()
    }

    /// Serialize into the bytes that get signed.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + 32 * self.account_keys.len());
        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);

        buf.extend_from_slice(&encode_compact_u16(self.account_keys.len() as u16));
        for key in &self.account_keys {
            buf.extend_from_slice(key);
        }
        buf.extend_from_slice(&self.recent_blockhash);

        buf.extend_from_slice(&encode_compact_u16(self.instructions.len() as u16));
        for ix in &self.instructions {
            buf.push(ix.program_id_index);
            buf.extend_from_slice(&encode_compact_u16(ix.account_indices.len() as u16));
            buf.extend_from_slice(&ix.account_indices);
            buf.extend_from_slice(&encode_compact_u16(ix.data.len() as u16));
            buf.extend_from_slice(&ix.data);
        }
        buf
    }
}

/// System Program `Transfer` of `lamports` from `from` to `to`.
pub fn system_transfer(from: &[u8; 32], to: &[u8; 32], lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_DISCRIMINANT.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            AccountMeta {
                pubkey: *from,
                is_signer: true,
                is_writable: true,
            },
            AccountMeta {
                pubkey: *to,
                is_signer: false,
                is_writable: true,
            },
        ],
        data,
    }
}

/// Build the message for a native SOL transfer paid for by `from`.
pub fn build_transfer_message(
    from: &[u8; 32],
    to: &[u8; 32],
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Result<Message, SolError> {
    Message::compile(&[system_transfer(from, to, lamports)], from, recent_blockhash)
}
