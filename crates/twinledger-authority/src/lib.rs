//! # twinledger-authority
//!
//! **Authority Ledger**: the slow, authoritative side of TwinLedger. It owns
//! confirmed balances, escrows value moving between the layers, and applies
//! the Executor's settlement batches.
//!
//! ## Lock lifecycle
//!
//! ```text
//!   initiate_lock          verify_settlement           release
//! ───────────────▶ LOCKED ──────────────────▶ VERIFIED ─────────▶ RELEASED
//!   (source debited)   │                                  (beneficiary credited)
//!                      │ TTL elapsed (sweeper or lazily)
//!                      ▼
//!                   EXPIRED (source refunded)
//! ```
//!
//! ## Components
//!
//! - [`AccountBook`]: confirmed and layer balances, bound public keys
//! - [`LockBook`]: bridge locks indexed by lock and bridge id
//! - [`BatchRegistry`]: applied settlement batches
//! - [`SupplyConservation`]: `Σ confirmed + Σ layer + Σ open locks == Σ issued`
//! - [`AuthorityLedger`]: the state machine tying them together
//! - [`AuthorityService`]: the ledger behind a mutex, implementing
//!   [`twinledger_types::AuthorityApi`]

pub mod accounts;
pub mod batch_registry;
pub mod ledger;
pub mod locks;
pub mod service;
pub mod supply;

pub use accounts::AccountBook;
pub use batch_registry::{BatchCheck, BatchRegistry};
pub use ledger::AuthorityLedger;
pub use locks::LockBook;
pub use service::AuthorityService;
pub use supply::SupplyConservation;
