//! Gateway configuration.

use marketpay_types::{Nano, TransactionRequestBuilder};
use serde::Deserialize;
use std::time::Duration;

/// Configuration loaded from `marketpay.toml` and `MARKETPAY_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    /// Marketplace backend base URL (payments + orders API).
    #[serde(default = "defaults::backend_url")]
    pub backend_url: String,

    /// Escrow contract every payment is sent to.
    #[serde(default = "defaults::escrow_address")]
    pub escrow_address: String,

    /// When set, intents naming another marketplace address are refused.
    #[serde(default)]
    pub marketplace_address: Option<String>,

    #[serde(default = "defaults::validity_secs")]
    pub validity_secs: u64,

    /// Gas attached on top of the price, in nano-units.
    #[serde(default = "defaults::gas_reserve_nano")]
    pub gas_reserve_nano: u64,

    #[serde(default = "defaults::connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "defaults::backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "defaults::max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// `MARKETPAY_API_KEY`. Unset means payment routes are open (dev mode).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: defaults::bind_address(),
            backend_url: defaults::backend_url(),
            escrow_address: defaults::escrow_address(),
            marketplace_address: None,
            validity_secs: defaults::validity_secs(),
            gas_reserve_nano: defaults::gas_reserve_nano(),
            connect_timeout_secs: defaults::connect_timeout_secs(),
            backend_timeout_secs: defaults::backend_timeout_secs(),
            request_timeout_secs: defaults::request_timeout_secs(),
            max_body_bytes: defaults::max_body_bytes(),
            max_concurrent_requests: defaults::max_concurrent_requests(),
            api_key: None,
        }
    }
}

impl Config {
    pub fn request_builder(&self) -> TransactionRequestBuilder {
        TransactionRequestBuilder::new()
            .with_validity_secs(self.validity_secs)
            .with_gas_reserve(self.gas_reserve())
    }

    pub fn gas_reserve(&self) -> Nano {
        Nano(u128::from(self.gas_reserve_nano))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Reject configs that would only fail later, per request.
    pub fn validate(&self) -> Result<(), crate::Error> {
        marketpay_types::Address::parse(&self.escrow_address)
            .map_err(|e| crate::Error::Config(format!("escrow_address: {e}")))?;
        if let Some(addr) = &self.marketplace_address {
            marketpay_types::Address::parse(addr)
                .map_err(|e| crate::Error::Config(format!("marketplace_address: {e}")))?;
        }
        if self.max_concurrent_requests == 0 {
            return Err(crate::Error::Config("max_concurrent_requests must be positive".into()));
        }
        if self.validity_secs == 0 || self.validity_secs > MAX_VALIDITY_SECS {
            return Err(crate::Error::Config(format!(
                "validity_secs must be within 1..={MAX_VALIDITY_SECS}, got {}",
                self.validity_secs
            )));
        }
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err(crate::Error::Config(format!(
                "backend_url must be http(s), got '{}'",
                self.backend_url
            )));
        }
        Ok(())
    }
}

/// Longest window a wallet may be given to sign a request.
const MAX_VALIDITY_SECS: u64 = 86_400;

mod defaults {
    pub fn bind_address() -> String {
        "0.0.0.0:3050".into()
    }

    pub fn backend_url() -> String {
        std::env::var("MARKETPAY_BACKEND_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "http://localhost:8080/api".into())
    }

    pub fn escrow_address() -> String {
        "0:0000000000000000000000000000000000000000000000000000000000000000".into()
    }

    pub fn validity_secs() -> u64 {
        300
    }

    pub fn gas_reserve_nano() -> u64 {
        50_000_000
    }

    pub fn connect_timeout_secs() -> u64 {
        120
    }

    pub fn backend_timeout_secs() -> u64 {
        10
    }

    pub fn request_timeout_secs() -> u64 {
        30
    }

    pub fn max_body_bytes() -> usize {
        64 * 1024
    }

    pub fn max_concurrent_requests() -> usize {
        256
    }
}
