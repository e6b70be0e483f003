//! Wall-clock helper shared by the services.
//!
//! Ledgers take `now` explicitly so their state machines stay deterministic
//! under test; only the service layer reads the clock.

use chrono::Utc;

/// Current unix time in whole seconds.
#[must_use]
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
