//! Solana payment backend.
//!
//! Submission flow:
//!
//! ```text
//! create_transaction ─ validate destination, fetch blockhash (retried),
//!                      compile System Program transfer
//! send_transaction   ─ sign ─ submit ─┬─ spawn confirmation wait ──────┐
//!                                     └─ rebroadcast loop             │
//!                                          until height expires,      │
//!                                          "already processed", or ◄──┘ resolved
//!                    ─ join confirmation ─ Confirmed / Failed / Expired
//! ```
//!
//! Every rebroadcast carries the same signed bytes, so the cluster's
//! signature deduplication guarantees at most one transfer executes.

use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::TokenBackend;
use crate::config::TokenConfig;
use crate::error::{TokenError, TokenResult};
use crate::retry::{retry, Attempt};
use crate::rpc::{HttpRpcClient, RpcError, SolanaRpc};
use crate::signer::TransactionSigner;
use crate::types::{Blockhash, Commitment, ConfirmationStatus, TransferIntent, Tx, UnsignedTransaction};

/// Slots a transaction must be buried under before lookups report it
/// confirmed.
pub const MIN_CONFIRMATIONS: u64 = 1;

/// Base fee of a single-signature transaction.
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Commitment used to track block height while rebroadcasting.
const REBROADCAST_HEIGHT_COMMITMENT: Commitment = Commitment::Confirmed;

type ConfirmationResult = Result<ConfirmationStatus, RpcError>;

/// Why the rebroadcast loop stopped.
#[derive(Debug)]
enum LoopExit {
    /// The confirmation task reported first. `None` if it went away
    /// without a result.
    Resolved(Option<ConfirmationResult>),
    /// A rebroadcast was answered with "already processed".
    AlreadyProcessed,
    /// Block height reached the blockhash's last valid height.
    HeightExceeded,
}

#[derive(Debug)]
struct Rebroadcast {
    exit: LoopExit,
    attempts: u32,
    last_error: Option<String>,
}

/// Aborts the confirmation task if the submission is dropped before it
/// finishes.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct SolanaToken {
    config: TokenConfig,
    signer: Arc<dyn TransactionSigner>,
    provider: OnceCell<Arc<dyn SolanaRpc>>,
}

impl SolanaToken {
    /// The RPC client is created on first use from `config.provider_url`.
    pub fn new(config: TokenConfig, signer: Arc<dyn TransactionSigner>) -> TokenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            signer,
            provider: OnceCell::new(),
        })
    }

    /// Use an existing RPC client instead of connecting to
    /// `config.provider_url`.
    pub fn with_provider(
        config: TokenConfig,
        signer: Arc<dyn TransactionSigner>,
        provider: Arc<dyn SolanaRpc>,
    ) -> Self {
        Self {
            config,
            signer,
            provider: OnceCell::new_with(Some(provider)),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    async fn provider(&self) -> TokenResult<Arc<dyn SolanaRpc>> {
        let provider = self
            .provider
            .get_or_try_init(|| async {
                let client = HttpRpcClient::new(&self.config.provider_url, self.config.rpc_timeout())?
                    .with_confirm_poll_interval(self.config.confirm_poll_interval());
                info!(url = %self.config.provider_url, "connected solana rpc client");
                Ok::<_, RpcError>(Arc::new(client) as Arc<dyn SolanaRpc>)
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    /// Build an unsigned transfer bound to a fresh blockhash.
    pub async fn create_transaction(&self, intent: TransferIntent) -> TokenResult<UnsignedTransaction> {
        let to = chain_sol::decode_transfer_destination(&intent.to)?;
        let lamports = u64::try_from(intent.amount).map_err(|_| {
            TokenError::InvalidAmount(format!("{} lamports does not fit in u64", intent.amount))
        })?;
        let payer = self.signer.public_key()?;

        let provider = self.provider().await?;
        let blockhash = self.fresh_blockhash(provider.as_ref()).await?;
        let recent = chain_sol::decode_address(&blockhash.blockhash)
            .map_err(|e| RpcError::Decode(format!("blockhash {}: {e}", blockhash.blockhash)))?;

        let message = chain_sol::build_transfer_message(&payer, &to, lamports, &recent)?;
        if intent.fee.is_some() {
            debug!("explicit fee ignored, solana fees follow the signature count");
        }
        debug!(
            to = %intent.to,
            lamports,
            blockhash = %blockhash.blockhash,
            last_valid_block_height = blockhash.last_valid_block_height,
            "created transfer"
        );

        Ok(UnsignedTransaction {
            message,
            blockhash,
            intent,
        })
    }

    /// Fetch a blockhash that is still valid at the current height.
    ///
    /// Only blockhash-class errors are retried; anything else bails.
    async fn fresh_blockhash(&self, provider: &dyn SolanaRpc) -> TokenResult<Blockhash> {
        let finality = self.config.finality;
        let classify = |e: RpcError| {
            if e.is_blockhash_error() {
                Attempt::Retry(e)
            } else {
                Attempt::Bail(e)
            }
        };

        let blockhash = retry(&self.config.blockhash_retry, |attempt| async move {
            debug!(attempt, "fetching latest blockhash");
            let blockhash = provider.get_latest_blockhash(finality).await.map_err(classify)?;
            let block_height = provider.get_block_height(finality).await.map_err(classify)?;
            if !blockhash.is_valid_at(block_height) {
                return Err(Attempt::Retry(RpcError::BlockhashExpired {
                    block_height,
                    last_valid_block_height: blockhash.last_valid_block_height,
                }));
            }
            Ok(blockhash)
        })
        .await?;
        Ok(blockhash)
    }

    /// Sign, submit and drive a transaction to a terminal state.
    ///
    /// Returns the signature of the first submission once the
    /// transaction reaches the configured finality.
    pub async fn send_transaction(&self, unsigned: UnsignedTransaction) -> TokenResult<String> {
        let provider = self.provider().await?;
        let signed = self
            .signer
            .sign_transaction(&unsigned.message)
            .await
            .map_err(|e| TokenError::SigningFailed(e.to_string()))?;
        let local_signature = signed.signature();
        let wire = signed.into_bytes();
        let blockhash = unsigned.blockhash;

        let (signature, landed) = match provider.send_raw_transaction(&wire).await {
            Ok(sig) => (sig, false),
            Err(e) if e.is_already_processed() => (local_signature.clone(), true),
            Err(e) => return Err(TokenError::SubmissionFailed(e.to_string())),
        };
        if signature != local_signature {
            warn!(%signature, local = %local_signature, "node reported a different signature");
        }
        info!(
            %signature,
            last_valid_block_height = blockhash.last_valid_block_height,
            "transaction submitted"
        );

        let (resolved_tx, mut resolved_rx) = oneshot::channel::<ConfirmationResult>();
        let _confirmation = AbortOnDrop(tokio::spawn({
            let provider = Arc::clone(&provider);
            let signature = signature.clone();
            let blockhash = blockhash.clone();
            let finality = self.config.finality;
            async move {
                let outcome = provider
                    .confirm_transaction(&signature, &blockhash, finality)
                    .await;
                // The receiver is gone only if the sender future was dropped.
                let _ = resolved_tx.send(outcome);
            }
        }));

        let report = if landed {
            Rebroadcast {
                exit: LoopExit::AlreadyProcessed,
                attempts: 0,
                last_error: None,
            }
        } else {
            self.rebroadcast(provider.as_ref(), &wire, &blockhash, &mut resolved_rx)
                .await
        };
        debug!(%signature, exit = ?report.exit, attempts = report.attempts, "rebroadcast loop finished");

        let outcome = match report.exit {
            LoopExit::Resolved(outcome) => outcome,
            LoopExit::AlreadyProcessed | LoopExit::HeightExceeded => resolved_rx.await.ok(),
        }
        .ok_or_else(|| TokenError::ConfirmationAborted(format!("confirmation task for {signature} ended without a result")))?;

        match outcome? {
            ConfirmationStatus::Confirmed { slot, err: None } => {
                info!(%signature, slot, "transaction confirmed");
                Ok(signature)
            }
            ConfirmationStatus::Confirmed { err: Some(reason), .. } => {
                warn!(%signature, %reason, "transaction failed on chain");
                Err(TokenError::TransactionFailed { signature, reason })
            }
            ConfirmationStatus::Expired => {
                warn!(%signature, last_error = ?report.last_error, "blockhash expired before confirmation");
                Err(TokenError::FreshnessExpired {
                    signature,
                    last_valid_block_height: blockhash.last_valid_block_height,
                    last_error: report.last_error,
                })
            }
        }
    }

    /// Rebroadcast `wire` until the blockhash expires, the cluster reports
    /// the signature as already processed, or confirmation resolves.
    ///
    /// Other submission errors are logged and the loop carries on.
    async fn rebroadcast(
        &self,
        provider: &dyn SolanaRpc,
        wire: &[u8],
        blockhash: &Blockhash,
        resolved: &mut oneshot::Receiver<ConfirmationResult>,
    ) -> Rebroadcast {
        let mut report = Rebroadcast {
            exit: LoopExit::HeightExceeded,
            attempts: 0,
            last_error: None,
        };
        let mut height = match provider.get_block_height(REBROADCAST_HEIGHT_COMMITMENT).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "unable to read block height, assuming blockhash is fresh");
                0
            }
        };

        while blockhash.is_valid_at(height) {
            match resolved.try_recv() {
                Ok(outcome) => {
                    report.exit = LoopExit::Resolved(Some(outcome));
                    return report;
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    report.exit = LoopExit::Resolved(None);
                    return report;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }

            report.attempts += 1;
            debug!(attempt = report.attempts, height, "sending again");
            match provider.send_raw_transaction(wire).await {
                Ok(_) => {}
                Err(e) if e.is_already_processed() => {
                    report.exit = LoopExit::AlreadyProcessed;
                    return report;
                }
                Err(e) => {
                    warn!(attempt = report.attempts, error = %e, "rebroadcast failed");
                    report.last_error = Some(e.to_string());
                }
            }

            tokio::select! {
                outcome = &mut *resolved => {
                    report.exit = LoopExit::Resolved(outcome.ok());
                    return report;
                }
                _ = tokio::time::sleep(self.config.resubmit_interval()) => {}
            }

            match provider.get_block_height(REBROADCAST_HEIGHT_COMMITMENT).await {
                Ok(h) => height = h,
                Err(e) => warn!(error = %e, height, "unable to refresh block height"),
            }
        }
        report
    }

    /// Look up a finalized transfer by signature.
    pub async fn get_transaction(&self, id: &str) -> TokenResult<Tx> {
        let provider = self.provider().await?;
        let finality = self.config.finality;

        let tx = provider
            .get_transaction(id, finality)
            .await?
            .ok_or_else(|| TokenError::NotFound(id.to_string()))?;
        let current_slot = provider.get_slot(finality).await?;

        let meta = tx
            .meta
            .as_ref()
            .ok_or_else(|| TokenError::UnresolvedMeta(id.to_string()))?;
        let (Some(&pre), Some(&post)) = (meta.pre_balances.get(1), meta.post_balances.get(1)) else {
            return Err(TokenError::UnresolvedMeta(format!("{id}: no destination balance")));
        };
        let (Some(from), Some(to)) = (tx.account_keys.first(), tx.account_keys.get(1)) else {
            return Err(TokenError::UnresolvedMeta(format!("{id}: fewer than two accounts")));
        };

        Ok(Tx {
            from: from.clone(),
            to: to.clone(),
            amount: i128::from(post) - i128::from(pre),
            block_height: tx.slot,
            pending: false,
            confirmed: current_slot.saturating_sub(tx.slot) >= MIN_CONFIRMATIONS,
        })
    }

    pub async fn get_fee(&self, _amount: U256, _to: Option<&str>) -> TokenResult<U256> {
        Ok(U256::from(LAMPORTS_PER_SIGNATURE))
    }

    pub async fn get_current_height(&self) -> TokenResult<u64> {
        let provider = self.provider().await?;
        Ok(provider.get_block_height(self.config.finality).await?)
    }

    pub fn public_key(&self) -> TokenResult<[u8; 32]> {
        Ok(self.signer.public_key()?)
    }
}

#[async_trait]
impl TokenBackend for SolanaToken {
    type UnsignedTx = UnsignedTransaction;

    async fn create_transaction(&self, intent: TransferIntent) -> TokenResult<UnsignedTransaction> {
        SolanaToken::create_transaction(self, intent).await
    }

    async fn send_transaction(&self, tx: UnsignedTransaction) -> TokenResult<String> {
        SolanaToken::send_transaction(self, tx).await
    }

    async fn get_transaction(&self, id: &str) -> TokenResult<Tx> {
        SolanaToken::get_transaction(self, id).await
    }

    async fn get_fee(&self, amount: U256, to: Option<&str>) -> TokenResult<U256> {
        SolanaToken::get_fee(self, amount, to).await
    }

    async fn get_current_height(&self) -> TokenResult<u64> {
        SolanaToken::get_current_height(self).await
    }

    fn public_key(&self) -> TokenResult<Vec<u8>> {
        Ok(SolanaToken::public_key(self)?.to_vec())
    }

    fn owner_to_address(&self, owner: &[u8]) -> String {
        chain_sol::owner_to_address(owner)
    }

    async fn sign(&self, data: &[u8]) -> TokenResult<Vec<u8>> {
        let signature = self
            .signer
            .sign_message(data)
            .await
            .map_err(|e| TokenError::SigningFailed(e.to_string()))?;
        Ok(signature.to_vec())
    }

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> TokenResult<bool> {
        Ok(chain_sol::verify_signature(public_key, data, signature)?)
    }
}
