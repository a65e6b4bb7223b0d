//! Database connection and initialization.

pub use epass_core::db::DatabaseError;

epass_core::define_database!(LedgerDatabase, "Ledger database migrations complete");

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = LedgerDatabase::open_in_memory().await;
        assert!(db.is_ok());
    }
}
