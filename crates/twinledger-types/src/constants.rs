//! System-wide constants for TwinLedger.

/// Maximum accepted distance, in seconds, between an envelope's timestamp
/// and the verifier's clock (past or future). One day.
pub const MAX_TIMESTAMP_SKEW_SECS: u64 = 86_400;

/// Time-to-live of a bridge lock that never receives a verified settlement.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3_600;

/// Interval between lock-expiry sweeps on the Authority.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Interval between settlement cycles on the Executor.
pub const DEFAULT_SETTLE_INTERVAL_SECS: u64 = 10;

/// Default retry attempts for network calls to the Authority.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 100;

/// Upper bound on a single backoff delay in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Backoff multiplier applied after every failed attempt.
pub const DEFAULT_RETRY_MULTIPLIER: u32 = 2;

/// How many times the orchestrator polls the Executor for a bridge credit.
pub const DEFAULT_BRIDGE_POLL_ATTEMPTS: u32 = 20;

/// Delay between bridge-credit polls in milliseconds.
pub const DEFAULT_BRIDGE_POLL_INTERVAL_MS: u64 = 250;

/// Default Authority API port.
pub const DEFAULT_AUTHORITY_PORT: u16 = 8080;

/// Default Executor API port.
pub const DEFAULT_EXECUTOR_PORT: u16 = 8081;

/// Recently credited lock ids remembered per Executor account.
pub const MAX_CREDITED_LOCKS_PER_ACCOUNT: usize = 64;

/// Settlement idempotency cache size (number of batch ids to remember).
pub const BATCH_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Prefix of every account address.
pub const ADDRESS_PREFIX: &str = "TL_";

/// Domain separator for settlement-proof signatures.
pub const PROOF_DOMAIN: &[u8] = b"twinledger:proof:v1:";

/// Domain separator for settlement-batch digests.
pub const BATCH_DOMAIN: &[u8] = b"twinledger:batch:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "TwinLedger";
