//! In-memory Solana cluster used by the integration tests.
//!
//! Block height advances by `height_step` on every `get_block_height` call,
//! which gives the rebroadcast loop a deterministic clock.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bundler_client::{
    Blockhash, Commitment, ConfirmationStatus, ConfirmedTransaction, KeypairSigner, RpcError,
    SolanaRpc, SolanaToken, TokenConfig,
};

pub const PAYER_SEED: [u8; 32] = [0x42; 32];

/// How the cluster answers one `sendTransaction`.
#[derive(Debug, Clone)]
pub enum SendResponse {
    /// Accepted by the node but never makes it into a block.
    Drop,
    /// Accepted and included.
    Land,
    /// Rejected as a duplicate of an earlier broadcast that landed.
    AlreadyProcessed,
    /// Transport-level failure.
    Fail(String),
}

#[derive(Debug)]
pub struct ClusterState {
    pub height: u64,
    pub height_step: u64,
    /// Height reads fail while the chain keeps advancing.
    pub fail_height_reads: bool,
    pub slot: u64,
    pub blockhash: Blockhash,
    /// Served before `blockhash` when non-empty.
    pub blockhash_queue: VecDeque<Blockhash>,
    pub blockhash_errors: VecDeque<RpcError>,
    pub blockhash_calls: u32,
    pub send_script: VecDeque<SendResponse>,
    pub sends: Vec<Vec<u8>>,
    /// Execution error recorded when the transaction lands.
    pub execution_error: Option<String>,
    pub landed: Option<ConfirmationStatus>,
    pub confirm_calls: u32,
    pub confirm_polls: u32,
    pub transactions: HashMap<String, ConfirmedTransaction>,
}

pub struct MockCluster {
    pub state: Mutex<ClusterState>,
}

impl MockCluster {
    pub fn new(height: u64, last_valid_block_height: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClusterState {
                height,
                height_step: 1,
                fail_height_reads: false,
                slot: height + 1_000,
                blockhash: blockhash(7, last_valid_block_height),
                blockhash_queue: VecDeque::new(),
                blockhash_errors: VecDeque::new(),
                blockhash_calls: 0,
                send_script: VecDeque::new(),
                sends: Vec::new(),
                execution_error: None,
                landed: None,
                confirm_calls: 0,
                confirm_polls: 0,
                transactions: HashMap::new(),
            }),
        })
    }

    pub fn script(&self, responses: impl IntoIterator<Item = SendResponse>) {
        self.state.lock().unwrap().send_script.extend(responses);
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ClusterState) -> R) -> R {
        f(&mut *self.state.lock().unwrap())
    }

    pub fn sends(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sends.clone()
    }
}

pub fn blockhash(seed: u8, last_valid_block_height: u64) -> Blockhash {
    Blockhash {
        blockhash: chain_sol::encode_address(&[seed; 32]),
        last_valid_block_height,
    }
}

pub fn already_processed() -> RpcError {
    RpcError::Server {
        code: -32002,
        message: "Transaction simulation failed: This transaction has already been processed".into(),
    }
}

fn signature_of(wire: &[u8]) -> String {
    bs58::encode(&wire[1..65]).into_string()
}

#[async_trait]
impl SolanaRpc for MockCluster {
    async fn get_latest_blockhash(&self, _commitment: Commitment) -> Result<Blockhash, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.blockhash_calls += 1;
        if let Some(err) = s.blockhash_errors.pop_front() {
            return Err(err);
        }
        Ok(s.blockhash_queue.pop_front().unwrap_or_else(|| s.blockhash.clone()))
    }

    async fn get_block_height(&self, _commitment: Commitment) -> Result<u64, RpcError> {
        let mut s = self.state.lock().unwrap();
        let height = s.height;
        s.height += s.height_step;
        if s.fail_height_reads {
            return Err(RpcError::Transport("node is unreachable".into()));
        }
        Ok(height)
    }

    async fn get_slot(&self, _commitment: Commitment) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().slot)
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String, RpcError> {
        let mut s = self.state.lock().unwrap();
        s.sends.push(wire.to_vec());
        let default = if s.landed.is_some() {
            SendResponse::AlreadyProcessed
        } else {
            SendResponse::Drop
        };
        let response = s.send_script.pop_front().unwrap_or(default);
        let land = |s: &mut ClusterState| {
            if s.landed.is_none() {
                s.landed = Some(ConfirmationStatus::Confirmed {
                    slot: s.slot,
                    err: s.execution_error.clone(),
                });
            }
        };
        match response {
            SendResponse::Drop => Ok(signature_of(wire)),
            SendResponse::Land => {
                land(&mut *s);
                Ok(signature_of(wire))
            }
            SendResponse::AlreadyProcessed => {
                land(&mut *s);
                Err(already_processed())
            }
            SendResponse::Fail(msg) => Err(RpcError::Transport(msg)),
        }
    }

    async fn confirm_transaction(
        &self,
        _signature: &str,
        blockhash: &Blockhash,
        _commitment: Commitment,
    ) -> Result<ConfirmationStatus, RpcError> {
        self.state.lock().unwrap().confirm_calls += 1;
        loop {
            {
                let mut s = self.state.lock().unwrap();
                s.confirm_polls += 1;
                if let Some(status) = &s.landed {
                    return Ok(status.clone());
                }
                if s.height > blockhash.last_valid_block_height {
                    return Ok(ConfirmationStatus::Expired);
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn get_transaction(
        &self,
        signature: &str,
        _commitment: Commitment,
    ) -> Result<Option<ConfirmedTransaction>, RpcError> {
        Ok(self.state.lock().unwrap().transactions.get(signature).cloned())
    }
}

pub fn test_config() -> TokenConfig {
    TokenConfig {
        provider_url: "http://127.0.0.1:8899".into(),
        ..TokenConfig::default()
    }
}

pub fn payer() -> Arc<KeypairSigner> {
    Arc::new(KeypairSigner::from_seed(PAYER_SEED))
}

pub fn token(cluster: &Arc<MockCluster>) -> SolanaToken {
    SolanaToken::with_provider(test_config(), payer(), cluster.clone())
}

pub fn destination() -> String {
    chain_sol::encode_address(&[0xBB; 32])
}
