//! # twinledger-api
//!
//! HTTP surface of TwinLedger.
//!
//! - [`authority_router`] / [`executor_router`]: axum routers over any
//!   [`AuthorityApi`](twinledger_types::AuthorityApi) /
//!   [`ExecutorApi`](twinledger_types::ExecutorApi) implementation
//! - [`AuthorityClient`] / [`ExecutorClient`]: reqwest implementations of
//!   the same traits, so an Executor can run against a remote Authority and
//!   the auto-bridge can drive both over the network
//! - [`config`]: TOML loading; [`telemetry`]: tracing setup
//!
//! Failed requests carry `{code, message, error}` bodies (see [`ErrorBody`])
//! that the clients decode back into the typed
//! [`LedgerError`](twinledger_types::LedgerError).

pub mod authority;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod server;
pub mod telemetry;
pub mod wire;

pub use authority::authority_router;
pub use client::{AuthorityClient, ExecutorClient};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorBody, status_for};
pub use executor::executor_router;
pub use server::{run_authority, run_executor};
pub use telemetry::init_tracing;
