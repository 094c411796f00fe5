//! Solana JSON-RPC access.
//!
//! [`SolanaRpc`] is the narrow surface the payment backend needs from the
//! network. [`HttpRpcClient`] implements it over HTTP with `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Blockhash, Commitment, ConfirmationStatus};

/// Message fragment the cluster returns when a signature was already seen.
const ALREADY_PROCESSED: &str = "already been processed";

/// Errors from a JSON-RPC round trip.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Decode(String),

    #[error("blockhash expired: block height {block_height} reached last valid height {last_valid_block_height}")]
    BlockhashExpired {
        block_height: u64,
        last_valid_block_height: u64,
    },
}

impl RpcError {
    /// The node rejected a submission because the signature already landed.
    pub fn is_already_processed(&self) -> bool {
        self.to_string().contains(ALREADY_PROCESSED)
    }

    /// Blockhash-class failures ("blockhash not found", expired blockhash)
    /// are transient and worth retrying.
    pub fn is_blockhash_error(&self) -> bool {
        self.to_string().to_ascii_lowercase().contains("blockhash")
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RpcError::Decode(e.to_string())
        } else {
            RpcError::Transport(e.to_string())
        }
    }
}

/// Execution metadata of a fetched transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

/// A transaction fetched by signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub slot: u64,
    pub meta: Option<TransactionMeta>,
    /// Static account keys, Base58, in message order.
    pub account_keys: Vec<String>,
}

/// Network operations used by the Solana backend.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<Blockhash, RpcError>;

    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, RpcError>;

    async fn get_slot(&self, commitment: Commitment) -> Result<u64, RpcError>;

    /// Submit signed wire bytes; returns the signature the node reports.
    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String, RpcError>;

    /// Wait until `signature` reaches `commitment`, or until the block
    /// height at `commitment` passes `blockhash.last_valid_block_height`
    /// without the signature having landed.
    async fn confirm_transaction(
        &self,
        signature: &str,
        blockhash: &Blockhash,
        commitment: Commitment,
    ) -> Result<ConfirmationStatus, RpcError>;

    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<ConfirmedTransaction>, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<Commitment>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    slot: u64,
    meta: Option<TransactionMeta>,
    transaction: RawTransactionBody,
}

#[derive(Debug, Deserialize)]
struct RawTransactionBody {
    message: RawMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    account_keys: Vec<String>,
}

/// JSON-RPC over HTTP.
pub struct HttpRpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
    confirm_poll_interval: Duration,
}

impl HttpRpcClient {
    /// Status polls between failures before a confirmation wait gives up.
    const MAX_CONSECUTIVE_POLL_ERRORS: u32 = 10;

    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
            confirm_poll_interval: Duration::from_millis(400),
        })
    }

    pub fn with_confirm_poll_interval(mut self, interval: Duration) -> Self {
        self.confirm_poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One JSON-RPC round trip. A `null` result comes back as `None`.
    async fn call_nullable<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, url = %self.url, "rpc request");

        let envelope: RpcEnvelope<T> = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match envelope.error {
            Some(err) => Err(RpcError::Server {
                code: err.code,
                message: err.message,
            }),
            None => Ok(envelope.result),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.call_nullable(method, params)
            .await?
            .ok_or_else(|| RpcError::Decode(format!("{method}: missing result")))
    }

    async fn signature_status(
        &self,
        signature: &str,
        search_history: bool,
    ) -> Result<Option<SignatureStatus>, RpcError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": search_history }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    /// One confirmation poll. `None` means keep waiting.
    async fn poll_confirmation(
        &self,
        signature: &str,
        blockhash: &Blockhash,
        commitment: Commitment,
    ) -> Result<Option<ConfirmationStatus>, RpcError> {
        if let Some(status) = self.signature_status(signature, false).await? {
            if status.err.is_some() || status.reached(commitment) {
                return Ok(Some(status.into_confirmed()));
            }
        }

        // Same commitment as the status check; confirmed height runs ahead
        // of finalized.
        let height = self.get_block_height(commitment).await?;
        if height <= blockhash.last_valid_block_height {
            return Ok(None);
        }

        match self.signature_status(signature, true).await? {
            None => Ok(Some(ConfirmationStatus::Expired)),
            Some(status) if status.err.is_some() || status.reached(Commitment::Confirmed) => {
                debug!(
                    signature,
                    level = ?status.confirmation_status,
                    %commitment,
                    "blockhash expired after the transaction landed"
                );
                Ok(Some(status.into_confirmed()))
            }
            // Processed only: it either gets confirmed or is dropped with
            // its fork, and a later poll sees which.
            Some(_) => Ok(None),
        }
    }
}

impl SignatureStatus {
    fn reached(&self, commitment: Commitment) -> bool {
        self.confirmation_status
            .is_some_and(|level| level >= commitment)
    }

    fn into_confirmed(self) -> ConfirmationStatus {
        ConfirmationStatus::Confirmed {
            slot: self.slot,
            err: self.err.map(|e| e.to_string()),
        }
    }
}

#[async_trait]
impl SolanaRpc for HttpRpcClient {
    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<Blockhash, RpcError> {
        let res: WithContext<Blockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": commitment }]))
            .await?;
        Ok(res.value)
    }

    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, RpcError> {
        self.call("getBlockHeight", json!([{ "commitment": commitment }]))
            .await
    }

    async fn get_slot(&self, commitment: Commitment) -> Result<u64, RpcError> {
        self.call("getSlot", json!([{ "commitment": commitment }])).await
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String, RpcError> {
        let encoded = bs58::encode(wire).into_string();
        self.call(
            "sendTransaction",
            json!([encoded, { "encoding": "base58", "skipPreflight": false }]),
        )
        .await
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        blockhash: &Blockhash,
        commitment: Commitment,
    ) -> Result<ConfirmationStatus, RpcError> {
        let mut failures = 0u32;
        loop {
            let polled = self.poll_confirmation(signature, blockhash, commitment).await;

            match polled {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => failures = 0,
                Err(e) => {
                    failures += 1;
                    warn!(signature, error = %e, failures, "signature status poll failed");
                    if failures >= Self::MAX_CONSECUTIVE_POLL_ERRORS {
                        return Err(e);
                    }
                }
            }
            tokio::time::sleep(self.confirm_poll_interval).await;
        }
    }

    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<ConfirmedTransaction>, RpcError> {
        let raw: Option<RawTransaction> = self
            .call_nullable(
                "getTransaction",
                json!([signature, {
                    "commitment": commitment,
                    "encoding": "json",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;

        Ok(raw.map(|tx| ConfirmedTransaction {
            slot: tx.slot,
            meta: tx.meta,
            account_keys: tx.transaction.message.account_keys,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_processed_is_detected_in_server_errors() {
        let err = RpcError::Server {
            code: -32002,
            message: "Transaction simulation failed: This transaction has already been processed"
                .into(),
        };
        assert!(err.is_already_processed());
        assert!(!RpcError::Transport("timeout".into()).is_already_processed());
    }

    #[test]
    fn blockhash_errors_are_classified() {
        let err = RpcError::Server {
            code: -32002,
            message: "Transaction simulation failed: Blockhash not found".into(),
        };
        assert!(err.is_blockhash_error());
        assert!(!RpcError::Transport("connection refused".into()).is_blockhash_error());
        assert!(RpcError::BlockhashExpired {
            block_height: 10,
            last_valid_block_height: 10,
        }
        .is_blockhash_error());
    }

    #[test]
    fn envelope_with_error_object_decodes() {
        let env: RpcEnvelope<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"Node is behind"}}"#,
        )
        .unwrap();
        assert!(env.result.is_none());
        assert_eq!(env.error.unwrap().code, -32005);
    }

    #[test]
    fn signature_status_decodes() {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = serde_json::from_str(
            r#"{"context":{"slot":82},"value":[{"slot":72,"confirmations":10,"err":null,"status":{"Ok":null},"confirmationStatus":"confirmed"},null]}"#,
        )
        .unwrap();
        let first = statuses.value[0].as_ref().unwrap();
        assert_eq!(first.slot, 72);
        assert!(first.err.is_none());
        assert_eq!(first.confirmation_status, Some(Commitment::Confirmed));
        assert!(statuses.value[1].is_none());
    }

    #[test]
    fn raw_transaction_decodes() {
        let raw: RawTransaction = serde_json::from_str(
            r#"{
                "slot": 430,
                "blockTime": null,
                "meta": {"err": null, "fee": 5000, "preBalances": [1000000, 0, 1], "postBalances": [994000, 1000, 1]},
                "transaction": {"message": {"accountKeys": ["A", "B", "11111111111111111111111111111111"]}, "signatures": ["sig"]}
            }"#,
        )
        .unwrap();
        assert_eq!(raw.slot, 430);
        let meta = raw.meta.unwrap();
        assert_eq!(meta.post_balances[1], 1000);
        assert_eq!(raw.transaction.message.account_keys[1], "B");
    }

    #[test]
    fn client_keeps_endpoint() {
        let client = HttpRpcClient::new("http://127.0.0.1:8899", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:8899");
    }
    mod node {
        use super::*;
        use std::io::{Read, Write};
        use std::net::{TcpListener, TcpStream};
        use std::sync::atomic::AtomicU32;
        use std::sync::{Arc, Mutex};

        /// Single-threaded JSON-RPC node answering from a handler.
        struct StubNode {
            url: String,
            calls: Arc<Mutex<Vec<(String, Value)>>>,
        }

        impl StubNode {
            fn start(handler: impl Fn(&str, &Value) -> Value + Send + 'static) -> Self {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let url = format!("http://{}", listener.local_addr().unwrap());
                let calls = Arc::new(Mutex::new(Vec::new()));
                let recorded = Arc::clone(&calls);
                std::thread::spawn(move || {
                    for stream in listener.incoming() {
                        let Ok(mut stream) = stream else { break };
                        let Some(request) = read_request(&mut stream) else {
                            continue;
                        };
                        let method = request["method"].as_str().unwrap_or_default().to_string();
                        let params = request["params"].clone();
                        let mut reply = handler(&method, &params);
                        recorded.lock().unwrap().push((method, params));
                        reply["jsonrpc"] = json!("2.0");
                        reply["id"] = request["id"].clone();
                        let body = reply.to_string();
                        let _ = write!(
                            stream,
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                    }
                });
                Self { url, calls }
            }

            fn client(&self) -> HttpRpcClient {
                HttpRpcClient::new(&self.url, Duration::from_secs(5))
                    .unwrap()
                    .with_confirm_poll_interval(Duration::from_millis(1))
            }

            fn calls(&self, method: &str) -> Vec<Value> {
                self.calls
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(m, _)| m == method)
                    .map(|(_, params)| params.clone())
                    .collect()
            }
        }

        fn read_request(stream: &mut TcpStream) -> Option<Value> {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    let body = end + 4;
                    while buf.len() < body + len {
                        let n = stream.read(&mut chunk).ok()?;
                        if n == 0 {
                            return None;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    return serde_json::from_slice(&buf[body..body + len]).ok();
                }
                let n = stream.read(&mut chunk).ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }

        fn ok(result: Value) -> Value {
            json!({ "result": result })
        }

        fn status(level: &str, err: Value) -> Value {
            ok(json!({
                "context": { "slot": 80 },
                "value": [{ "slot": 72, "confirmations": null, "err": err, "confirmationStatus": level }],
            }))
        }

        fn no_status() -> Value {
            ok(json!({ "context": { "slot": 80 }, "value": [null] }))
        }

        fn token(last_valid_block_height: u64) -> Blockhash {
            Blockhash {
                blockhash: "4sGjMW1sUnHzSxGspuhpqLDx6wiyjNtZAMdL4VZHirAn".into(),
                last_valid_block_height,
            }
        }

        #[tokio::test]
        async fn waits_for_the_requested_commitment() {
            let polls = AtomicU32::new(0);
            let node = StubNode::start(move |method, _| match method {
                "getSignatureStatuses" => {
                    if polls.fetch_add(1, Ordering::SeqCst) < 2 {
                        status("confirmed", Value::Null)
                    } else {
                        status("finalized", Value::Null)
                    }
                }
                "getBlockHeight" => ok(json!(100)),
                _ => unreachable!("{method}"),
            });

            let outcome = node
                .client()
                .confirm_transaction("sig", &token(110), Commitment::Finalized)
                .await
                .unwrap();

            assert_eq!(outcome, ConfirmationStatus::Confirmed { slot: 72, err: None });
            assert_eq!(node.calls("getSignatureStatuses").len(), 3);
        }

        #[tokio::test]
        async fn landed_transaction_survives_height_passing_last_valid() {
            let node = StubNode::start(|method, _| match method {
                "getSignatureStatuses" => status("confirmed", Value::Null),
                "getBlockHeight" => ok(json!(111)),
                _ => unreachable!("{method}"),
            });

            let outcome = node
                .client()
                .confirm_transaction("sig", &token(110), Commitment::Finalized)
                .await
                .unwrap();

            assert_eq!(outcome, ConfirmationStatus::Confirmed { slot: 72, err: None });
            let heights = node.calls("getBlockHeight");
            assert!(heights.iter().all(|p| p[0]["commitment"] == "finalized"));
            let statuses = node.calls("getSignatureStatuses");
            assert_eq!(statuses.last().unwrap()[1]["searchTransactionHistory"], true);
        }

        #[tokio::test]
        async fn execution_error_resolves_without_waiting() {
            let node = StubNode::start(|method, _| match method {
                "getSignatureStatuses" => {
                    status("processed", json!({ "InstructionError": [0, { "Custom": 1 }] }))
                }
                _ => unreachable!("{method}"),
            });

            let outcome = node
                .client()
                .confirm_transaction("sig", &token(110), Commitment::Finalized)
                .await
                .unwrap();

            match outcome {
                ConfirmationStatus::Confirmed { slot, err: Some(err) } => {
                    assert_eq!(slot, 72);
                    assert!(err.contains("Custom"));
                }
                other => panic!("expected an execution error, got {other:?}"),
            }
            assert!(node.calls("getBlockHeight").is_empty());
        }

        #[tokio::test]
        async fn unknown_signature_expires_after_history_lookup() {
            let node = StubNode::start(|method, _| match method {
                "getSignatureStatuses" => no_status(),
                "getBlockHeight" => ok(json!(111)),
                _ => unreachable!("{method}"),
            });

            let outcome = node
                .client()
                .confirm_transaction("sig", &token(110), Commitment::Confirmed)
                .await
                .unwrap();

            assert_eq!(outcome, ConfirmationStatus::Expired);
            let statuses = node.calls("getSignatureStatuses");
            assert_eq!(statuses.len(), 2);
            assert_eq!(statuses[0][1]["searchTransactionHistory"], false);
            assert_eq!(statuses[1][1]["searchTransactionHistory"], true);
        }

        #[tokio::test]
        async fn processed_signature_keeps_waiting_past_expiry() {
            let polls = AtomicU32::new(0);
            let node = StubNode::start(move |method, _| match method {
                "getSignatureStatuses" => {
                    if polls.fetch_add(1, Ordering::SeqCst) < 4 {
                        status("processed", Value::Null)
                    } else {
                        status("finalized", Value::Null)
                    }
                }
                "getBlockHeight" => ok(json!(111)),
                _ => unreachable!("{method}"),
            });

            let outcome = node
                .client()
                .confirm_transaction("sig", &token(110), Commitment::Finalized)
                .await
                .unwrap();

            assert_eq!(outcome, ConfirmationStatus::Confirmed { slot: 72, err: None });
            assert_eq!(node.calls("getSignatureStatuses").len(), 5);
        }

        #[tokio::test]
        async fn gives_up_after_consecutive_poll_errors() {
            let node = StubNode::start(|method, _| match method {
                "getSignatureStatuses" => {
                    json!({ "error": { "code": -32005, "message": "Node is behind by 42 slots" } })
                }
                _ => unreachable!("{method}"),
            });

            let err = node
                .client()
                .confirm_transaction("sig", &token(110), Commitment::Finalized)
                .await
                .unwrap_err();

            assert!(matches!(err, RpcError::Server { code: -32005, .. }), "{err:?}");
            assert_eq!(
                node.calls("getSignatureStatuses").len(),
                HttpRpcClient::MAX_CONSECUTIVE_POLL_ERRORS as usize
            );
        }

        #[tokio::test]
        async fn error_object_becomes_server_error() {
            let node = StubNode::start(|_, _| {
                json!({ "error": { "code": -32002, "message": "Blockhash not found" } })
            });

            let err = node
                .client()
                .get_latest_blockhash(Commitment::Finalized)
                .await
                .unwrap_err();

            match &err {
                RpcError::Server { code, message } => {
                    assert_eq!(*code, -32002);
                    assert_eq!(message, "Blockhash not found");
                }
                other => panic!("expected a server error, got {other:?}"),
            }
            assert!(err.is_blockhash_error());
        }

        #[tokio::test]
        async fn missing_transaction_is_none() {
            let node = StubNode::start(|method, _| match method {
                "getTransaction" => ok(Value::Null),
                _ => unreachable!("{method}"),
            });

            let tx = node
                .client()
                .get_transaction("sig", Commitment::Finalized)
                .await
                .unwrap();

            assert!(tx.is_none());
            let params = &node.calls("getTransaction")[0];
            assert_eq!(params[1]["maxSupportedTransactionVersion"], 0);
            assert_eq!(params[1]["encoding"], "json");
        }

        #[tokio::test]
        async fn raw_transaction_is_sent_as_base58() {
            let node = StubNode::start(|method, _| match method {
                "sendTransaction" => ok(json!("3nodeReportedSig")),
                _ => unreachable!("{method}"),
            });
            let wire = [1u8, 2, 3, 4, 5];

            let signature = node.client().send_raw_transaction(&wire).await.unwrap();

            assert_eq!(signature, "3nodeReportedSig");
            let params = &node.calls("sendTransaction")[0];
            assert_eq!(params[0], bs58::encode(wire).into_string());
            assert_eq!(params[1]["encoding"], "base58");
        }
    }
}
