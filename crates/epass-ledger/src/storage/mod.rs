//! SQLite storage for the E-Pass ledger.
//!
//! Provides persistence for persons, events, registrations, passes, and the
//! append-only check-in log.

mod db;
mod models;
mod queries;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, LedgerDatabase};
pub use models::*;
pub use queries::{CheckinOutcome, CheckinParams, PassParams, PassRecord};
