//! Backend configuration.
//!
//! Values come from the caller or from the environment (with `.env`
//! support). Anything missing falls back to the defaults below.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{TokenError, TokenResult};
use crate::registry::Currency;
use crate::retry::RetryPolicy;
use crate::types::Commitment;

pub const DEFAULT_SOLANA_PROVIDER_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub currency: Currency,
    pub provider_url: String,
    /// Commitment used for blockhashes, confirmation and lookups.
    pub finality: Commitment,
    /// Delay between rebroadcasts of a pending transaction.
    pub resubmit_interval_ms: u64,
    /// Delay between signature status polls while waiting for confirmation.
    pub confirm_poll_interval_ms: u64,
    pub rpc_timeout_secs: u64,
    /// Policy for fetching a fresh blockhash.
    pub blockhash_retry: RetryPolicy,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Solana,
            provider_url: DEFAULT_SOLANA_PROVIDER_URL.to_string(),
            finality: Commitment::Finalized,
            resubmit_interval_ms: 500,
            confirm_poll_interval_ms: 400,
            rpc_timeout_secs: 60,
            blockhash_retry: RetryPolicy::default(),
        }
    }
}

impl TokenConfig {
    /// Build from `BUNDLER_CURRENCY`, `SOLANA_PROVIDER_URL`,
    /// `SOLANA_FINALITY`, `SOLANA_RESUBMIT_INTERVAL_MS`,
    /// `SOLANA_CONFIRM_POLL_INTERVAL_MS` and `SOLANA_RPC_TIMEOUT_SECS`,
    /// loading `.env` first if present.
    pub fn from_env() -> TokenResult<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let currency = match env::var("BUNDLER_CURRENCY") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.currency,
        };
        let provider_url = env::var("SOLANA_PROVIDER_URL").unwrap_or(defaults.provider_url);
        let finality = match env::var("SOLANA_FINALITY") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.finality,
        };
        let resubmit_interval_ms = parse_var("SOLANA_RESUBMIT_INTERVAL_MS", defaults.resubmit_interval_ms)?;
        let confirm_poll_interval_ms =
            parse_var("SOLANA_CONFIRM_POLL_INTERVAL_MS", defaults.confirm_poll_interval_ms)?;
        let rpc_timeout_secs = parse_var("SOLANA_RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs)?;

        let cfg = Self {
            currency,
            provider_url,
            finality,
            resubmit_interval_ms,
            confirm_poll_interval_ms,
            rpc_timeout_secs,
            blockhash_retry: defaults.blockhash_retry,
        };
        cfg.validate()?;
        info!(currency = %cfg.currency, provider_url = %cfg.provider_url, finality = %cfg.finality, "loaded token config");
        Ok(cfg)
    }

    pub fn validate(&self) -> TokenResult<()> {
        let url = reqwest::Url::parse(&self.provider_url)
            .map_err(|e| TokenError::Config(format!("provider_url {:?}: {e}", self.provider_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TokenError::Config(format!(
                "provider_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.resubmit_interval_ms == 0 {
            return Err(TokenError::Config("resubmit_interval_ms must be > 0".into()));
        }
        if self.confirm_poll_interval_ms == 0 {
            return Err(TokenError::Config("confirm_poll_interval_ms must be > 0".into()));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(TokenError::Config("rpc_timeout_secs must be > 0".into()));
        }
        if self.blockhash_retry.attempts == 0 {
            return Err(TokenError::Config("blockhash_retry.attempts must be > 0".into()));
        }
        Ok(())
    }

    pub fn resubmit_interval(&self) -> Duration {
        Duration::from_millis(self.resubmit_interval_ms)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

fn parse_var(name: &str, default: u64) -> TokenResult<u64> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|e| TokenError::Config(format!("{name}={v:?}: {e}"))),
        Err(_) => Ok(default),
    }
}
