//! Repository layer: entity-scoped operations on the HITL database.
//!
//! Functions take a borrowed `Connection` so callers decide the transaction
//! boundary. `db::HitlStore` wraps them behind a shared, locked connection.

mod audit;
mod feedback;
mod pattern;
mod stats;

pub use audit::*;
pub use feedback::*;
pub use pattern::*;
pub use stats::*;

use std::str::FromStr;

use crate::db::DatabaseError;
use crate::models::Classification;

/// Millisecond UTC timestamp; sorts lexicographically.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

pub(crate) fn classification_from_db(value: &str) -> Result<Classification, DatabaseError> {
    Classification::from_str(value)
}
