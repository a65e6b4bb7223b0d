//! Database connection and initialization.

pub use epass_core::db::DatabaseError;

epass_core::define_database!(ScannerDatabase, "Scanner database migrations complete");
