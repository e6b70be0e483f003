//! # twinledger-types
//!
//! Shared types, errors, and configuration for **TwinLedger**.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`LockId`], [`BridgeId`], [`BatchId`]
//! - **Envelope model**: [`SignedEnvelope`], [`AuthorityPayload`], [`ExecutorPayload`]
//! - **Bridge model**: [`BridgeLock`], [`LockStatus`], [`Layer`], [`SettlementProof`]
//! - **Settlement model**: [`SettlementBatch`], [`BatchEntry`], [`BatchStatus`]
//! - **Balance views**: [`AuthorityBalance`], [`ExecutorBalance`]
//! - **Receipts**: [`TransferReceipt`], [`LockReceipt`], [`ReleaseReceipt`], [`ActionReceipt`]
//! - **Configuration**: [`AuthorityConfig`], [`ExecutorConfig`], [`RetryPolicy`], [`PollPolicy`]
//! - **Service seams**: [`AuthorityApi`], [`ExecutorApi`]
//! - **Errors**: [`LedgerError`] with `TL_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod account;
pub mod api;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod receipt;
pub mod settlement;
pub mod time;

// Re-export all primary types at crate root for ergonomic imports:
//   use twinledger_types::{Address, BridgeLock, SignedEnvelope, ...};

pub use account::*;
pub use api::*;
pub use bridge::*;
pub use config::*;
pub use envelope::*;
pub use error::*;
pub use ids::*;
pub use receipt::*;
pub use settlement::*;
pub use time::unix_now;

// Constants are accessed via `twinledger_types::constants::FOO`
// (not re-exported to avoid name collisions).
