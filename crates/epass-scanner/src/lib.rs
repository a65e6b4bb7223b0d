//! E-Pass Scanner
//!
//! Check-in terminal agent. Holds the device's local pass cache and
//! pending check-in queue, runs the scan engine (online verify with
//! offline fallback), and reconciles queued admissions into the ledger
//! in batches.

pub mod client;
pub mod engine;
pub mod storage;
pub mod sync;

pub use client::{ClientError, LedgerClient};
pub use engine::{EngineStatus, ScanEngine, ScanFeedback};
pub use sync::{Reconciler, SyncReport};
