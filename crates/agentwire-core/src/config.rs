use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

pub const ENV_USE_LEGACY_DID_SOV_PREFIX: &str = "AGENTWIRE_USE_LEGACY_DID_SOV_PREFIX";
pub const ENV_CRYPTO_TIMEOUT_MS: &str = "AGENTWIRE_CRYPTO_TIMEOUT_MS";
pub const ENV_REJECT_MULTI_RECIPIENT_ROUTING: &str = "AGENTWIRE_REJECT_MULTI_RECIPIENT_ROUTING";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Render `@type` with the legacy did:sov prefix on every packed message
    pub use_legacy_did_sov_prefix: bool,

    /// Upper bound for each crypto capability call; unbounded when unset
    pub crypto_timeout_ms: Option<u64>,

    /// Fail instead of forwarding only to the first recipient when routing
    /// a message addressed to several recipients
    pub reject_multi_recipient_routing: bool,
}

impl EnvelopeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: EnvelopeConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from defaults overridden by whatever `lookup` returns for the
    /// `AGENTWIRE_*` variables. Unparseable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(flag) = lookup(ENV_USE_LEGACY_DID_SOV_PREFIX).and_then(|v| parse_flag(&v)) {
            config.use_legacy_did_sov_prefix = flag;
        }
        if let Some(ms) = lookup(ENV_CRYPTO_TIMEOUT_MS).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.crypto_timeout_ms = Some(ms);
        }
        if let Some(flag) =
            lookup(ENV_REJECT_MULTI_RECIPIENT_ROUTING).and_then(|v| parse_flag(&v))
        {
            config.reject_multi_recipient_routing = flag;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crypto_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "crypto_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn crypto_timeout(&self) -> Option<Duration> {
        self.crypto_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_legacy_did_sov_prefix(mut self, enabled: bool) -> Self {
        self.use_legacy_did_sov_prefix = enabled;
        self
    }

    /// Set the per-call timeout, rounded up to whole milliseconds (at least 1).
    pub fn with_crypto_timeout(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_nanos().div_ceil(1_000_000).max(1);
        self.crypto_timeout_ms = Some(u64::try_from(ms).unwrap_or(u64::MAX));
        self
    }

    pub fn with_reject_multi_recipient_routing(mut self, enabled: bool) -> Self {
        self.reject_multi_recipient_routing = enabled;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
