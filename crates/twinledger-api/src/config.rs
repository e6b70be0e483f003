//! TOML configuration files.
//!
//! Every config type carries serde defaults, so a missing file section (or a
//! missing file path) falls back to [`Default`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use twinledger_types::{BridgeConfig, LedgerError, Result, constants};

/// Configuration of a client driving both services (`twinledger bet`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub authority_url: String,
    pub executor_url: String,
    pub request_timeout_ms: u64,
    pub bridge: BridgeConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authority_url: format!("http://127.0.0.1:{}", constants::DEFAULT_AUTHORITY_PORT),
            executor_url: format!("http://127.0.0.1:{}", constants::DEFAULT_EXECUTOR_PORT),
            request_timeout_ms: 5_000,
            bridge: BridgeConfig::default(),
        }
    }
}

/// Parse TOML text into `T`.
pub fn parse<T: DeserializeOwned>(text: &str) -> Result<T> {
    toml::from_str(text).map_err(|e| LedgerError::Configuration(e.to_string()))
}

/// Load `T` from `path`, or its defaults when no path is given.
pub fn load<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        info!("no config file given, using defaults");
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        LedgerError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    info!(path = %path.display(), "loaded config");
    parse(&text)
}
