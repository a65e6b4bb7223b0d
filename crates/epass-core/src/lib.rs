//! `E-Pass` Core Library
//!
//! Shared functionality for `E-Pass` components:
//! - Admission decision logic used identically online and offline
//! - HTTP wire types for the check-in API
//! - Configuration resolution and hierarchy
//! - `SQLite` helpers shared by ledger and scanner storage layers
//! - Common error types

pub mod admission;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use admission::{
    CheckinType, DenyReason, Eligibility, PassLookup, PassStatus, RegistrationStatus, evaluate,
};
pub use config::Config;
pub use error::{Error, Result};
