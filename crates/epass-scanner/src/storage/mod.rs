//! SQLite storage for the E-Pass scanner.
//!
//! Provides persistence for the local pass cache, the pending check-in
//! queue, and the operator-facing check-in log.

mod db;
mod models;
mod queries;


pub use db::{DatabaseError, ScannerDatabase};
pub use models::*;
pub use queries::PendingParams;
