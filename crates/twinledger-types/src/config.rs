//! Configuration types for TwinLedger nodes.
//!
//! Every field has a serde default drawn from [`crate::constants`], so a
//! config file only needs to name what differs from the defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, constants};

/// Configuration of an Authority node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Address the HTTP API listens on.
    pub listen_addr: SocketAddr,
    /// Maximum envelope timestamp skew in seconds.
    pub max_skew_secs: u64,
    /// Lifetime of an unverified bridge lock.
    pub lock_ttl_secs: u64,
    /// Interval of the lock-expiry sweeper.
    pub sweep_interval_secs: u64,
    /// Hex ed25519 key the Executor signs settlement proofs and batches with.
    pub executor_public_key: String,
    /// Initial issuance.
    pub genesis: Vec<GenesisAllocation>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, constants::DEFAULT_AUTHORITY_PORT)),
            max_skew_secs: constants::MAX_TIMESTAMP_SKEW_SECS,
            lock_ttl_secs: constants::DEFAULT_LOCK_TTL_SECS,
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            executor_public_key: String::new(),
            genesis: Vec::new(),
        }
    }
}

/// One genesis issuance line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    /// Bound to the account at genesis when present.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Issued into the confirmed (Authority) balance.
    #[serde(default)]
    pub confirmed: Decimal,
    /// Issued directly onto the Executor layer (e.g. the house bankroll).
    #[serde(default)]
    pub layer: Decimal,
}

/// Configuration of an Executor node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub listen_addr: SocketAddr,
    /// Base URL of the Authority API.
    pub authority_url: String,
    /// Account that takes stakes and funds payouts.
    pub house_address: Address,
    /// Hex ed25519 secret key used for settlement proofs and batches.
    pub signing_key_hex: String,
    pub max_skew_secs: u64,
    /// Interval of the background settlement loop.
    pub settle_interval_secs: u64,
    /// Per-request HTTP timeout when talking to the Authority.
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, constants::DEFAULT_EXECUTOR_PORT)),
            authority_url: format!("http://127.0.0.1:{}", constants::DEFAULT_AUTHORITY_PORT),
            house_address: Address::from("TL_HOUSE"),
            signing_key_hex: String::new(),
            max_skew_secs: constants::MAX_TIMESTAMP_SKEW_SECS,
            settle_interval_secs: constants::DEFAULT_SETTLE_INTERVAL_SECS,
            request_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff for network calls.
///
/// Attempt `n` (0-based) waits `initial_delay_ms * multiplier^n`, capped at
/// `max_delay_ms`, before the next try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Backoff before the retry that follows failed attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// No waiting between attempts. Useful in tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_delay_ms: constants::DEFAULT_RETRY_INITIAL_DELAY_MS,
            max_delay_ms: constants::DEFAULT_RETRY_MAX_DELAY_MS,
            multiplier: constants::DEFAULT_RETRY_MULTIPLIER,
        }
    }
}

/// Fixed-interval polling used while waiting for a bridge credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl PollPolicy {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: constants::DEFAULT_BRIDGE_POLL_ATTEMPTS,
            interval_ms: constants::DEFAULT_BRIDGE_POLL_INTERVAL_MS,
        }
    }
}

/// Configuration of the auto-bridge orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub retry: RetryPolicy,
    pub poll: PollPolicy,
}
