//! # twinledger-executor
//!
//! **Optimistic Executor**: applies signed betting actions immediately against
//! a hybrid balance, and reconciles with the Authority in the background.
//!
//! ## Balance model
//!
//! ```text
//! available = confirmed (Authority's executor view at last sync)
//!           + pending_delta (applied, not yet settled)
//! ```
//!
//! ## Flow
//!
//! 1. `apply_action` → verify envelope, debit/credit `pending_delta` (no I/O)
//! 2. `sync_from_l1` → finalise inbound bridge locks, overwrite `confirmed`
//! 3. `settle_to_l1` → snapshot pending values into a signed batch, submit,
//!    retire the snapshotted portion on acknowledgement
//!
//! The service never holds its ledger lock across a call to the Authority.

pub mod batcher;
pub mod book;
pub mod ledger;
pub mod retry;
pub mod service;

pub use batcher::Batcher;
pub use book::{HybridAccount, HybridBook};
pub use ledger::{ExecutorLedger, SyncOutcome};
pub use retry::with_retry;
pub use service::ExecutorService;
