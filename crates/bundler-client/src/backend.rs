//! The capability set every payment backend provides.

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::error::TokenResult;
use crate::types::{TransferIntent, Tx};

#[async_trait]
pub trait TokenBackend: Send + Sync {
    /// Chain-native unsigned transaction.
    type UnsignedTx: Send;

    async fn create_transaction(&self, intent: TransferIntent) -> TokenResult<Self::UnsignedTx>;

    /// Sign, submit and wait for the transaction; returns its id.
    async fn send_transaction(&self, tx: Self::UnsignedTx) -> TokenResult<String>;

    async fn get_transaction(&self, id: &str) -> TokenResult<Tx>;

    async fn get_fee(&self, amount: U256, to: Option<&str>) -> TokenResult<U256>;

    async fn get_current_height(&self) -> TokenResult<u64>;

    fn public_key(&self) -> TokenResult<Vec<u8>>;

    fn owner_to_address(&self, owner: &[u8]) -> String;

    async fn sign(&self, data: &[u8]) -> TokenResult<Vec<u8>>;

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> TokenResult<bool>;
}
