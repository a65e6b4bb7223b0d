//! E-Pass Ledger
//!
//! The only place admission truth is written. Duplicate admission is
//! detected by the storage layer's uniqueness constraint on the check-in
//! tuple, never by application-level check-then-insert.

pub mod routes;
pub mod storage;
