//! # twinledger-bridge
//!
//! Moves funds from the Authority to the Executor on demand. [`AutoBridge`]
//! sits in front of Executor actions: when the actor's available balance is
//! short it locks the deficit on the Authority, waits for the Executor to
//! pick up the credit, then applies the action.
//!
//! In-transit locks are tracked per address in [`PendingBridges`] and count
//! toward later deficits until credited or expired.

pub mod orchestrator;
pub mod tracker;

pub use orchestrator::{AutoBridge, Funding};
pub use tracker::{PendingBridges, TrackedBridge};
