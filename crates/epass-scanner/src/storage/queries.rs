//! Database queries for the E-Pass scanner.

use epass_core::api::CacheEntryPayload;
use epass_core::db::unix_timestamp;

use super::db::{DatabaseError, ScannerDatabase};
use super::models::{CacheEntry, CheckinLogEntry, PendingCheckin};

/// The operator feed keeps only a recent window.
const LOG_CAP: i64 = 500;

/// Parameters for queueing one offline admission.
#[derive(Debug, Clone)]
pub struct PendingParams<'a> {
    pub token: &'a str,
    pub token_hash: &'a str,
    pub checkin_type: &'a str,
    pub session_id: Option<&'a str>,
    pub nonce: &'a str,
}

impl ScannerDatabase {
    // =========================================================================
    // Local pass cache
    // =========================================================================

    /// Atomically replace the device's pass snapshot for an event.
    ///
    /// Clear-then-bulk-insert inside one transaction: readers see either
    /// the old complete snapshot or the new one, never a partial mix.
    pub async fn replace_cache(
        &self,
        event_id: &str,
        entries: &[CacheEntryPayload],
        cached_at: i64,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM cache_entries WHERE event_id = ?")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO cache_entries (token_hash, participant_code, signed_code, person_name, korean_name, confirmation_code, event_id, event_name, is_active, registration_status, cached_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.token_hash)
            .bind(&entry.participant_code)
            .bind(&entry.signed_code)
            .bind(&entry.person_name)
            .bind(&entry.korean_name)
            .bind(&entry.confirmation_code)
            .bind(&entry.event_id)
            .bind(&entry.event_name)
            .bind(i64::from(entry.is_active))
            .bind(&entry.registration_status)
            .bind(cached_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Look up a cached pass by token hash.
    pub async fn cache_lookup_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<CacheEntry>, DatabaseError> {
        let entry =
            sqlx::query_as::<_, CacheEntry>("SELECT * FROM cache_entries WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(self.pool())
                .await?;

        Ok(entry)
    }

    /// Look up a cached pass by participant code (manual entry path).
    pub async fn cache_lookup_by_code(
        &self,
        code: &str,
    ) -> Result<Option<CacheEntry>, DatabaseError> {
        let entry = sqlx::query_as::<_, CacheEntry>(
            "SELECT * FROM cache_entries WHERE participant_code = ?",
        )
        .bind(code)
        .fetch_optional(self.pool())
        .await?;

        Ok(entry)
    }

    /// Number of cached passes on the device.
    pub async fn cache_count(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    /// Timestamp of the last successful refresh, if any.
    pub async fn cache_refreshed_at(&self) -> Result<Option<i64>, DatabaseError> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(cached_at) FROM cache_entries")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    // =========================================================================
    // Pending check-in queue
    // =========================================================================

    /// Append one offline admission to the pending queue.
    pub async fn enqueue_pending(
        &self,
        params: &PendingParams<'_>,
    ) -> Result<PendingCheckin, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO pending_checkins (token, token_hash, checkin_type, session_id, nonce, created_at, synced) VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(params.token)
        .bind(params.token_hash)
        .bind(params.checkin_type)
        .bind(params.session_id)
        .bind(params.nonce)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_pending(result.last_insert_rowid()).await
    }

    /// Get a pending entry by ID.
    pub async fn get_pending(&self, id: i64) -> Result<PendingCheckin, DatabaseError> {
        sqlx::query_as::<_, PendingCheckin>("SELECT * FROM pending_checkins WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Pending check-in {id}")))
    }

    /// Unsynced entries in enqueue order, bounded for one batch round.
    /// Restartable: re-listing at any time yields a consistent pending set.
    pub async fn list_unsynced(&self, limit: u32) -> Result<Vec<PendingCheckin>, DatabaseError> {
        let entries = sqlx::query_as::<_, PendingCheckin>(
            "SELECT * FROM pending_checkins WHERE synced = 0 ORDER BY id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(entries)
    }

    /// Flip entries to synced in place. Never deletes; the queue doubles
    /// as a local forensic trail of what was attempted offline.
    pub async fn mark_synced(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        let mut updated = 0;
        for id in ids {
            let result = sqlx::query("UPDATE pending_checkins SET synced = 1 WHERE id = ?")
                .bind(id)
                .execute(self.pool())
                .await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    /// Count of entries still awaiting reconciliation.
    pub async fn count_unsynced(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_checkins WHERE synced = 0")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    /// Whether an unsynced admission for this tuple is already queued
    /// (same-device duplicate detection while offline).
    pub async fn has_unsynced_for(
        &self,
        token_hash: &str,
        checkin_type: &str,
        session_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM pending_checkins WHERE synced = 0 AND token_hash = ? AND checkin_type = ? AND session_id IS ? LIMIT 1",
        )
        .bind(token_hash)
        .bind(checkin_type)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }

    // =========================================================================
    // Check-in log (operator feed)
    // =========================================================================

    /// Append one entry to the operator feed and prune beyond the cap.
    pub async fn append_log(
        &self,
        token_hash: &str,
        display_name: &str,
        checkin_type: &str,
        session_id: Option<&str>,
        status: &str,
        offline: bool,
        nonce: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO checkin_log (token_hash, display_name, checkin_type, session_id, status, offline, nonce, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(display_name)
        .bind(checkin_type)
        .bind(session_id)
        .bind(status)
        .bind(i64::from(offline))
        .bind(nonce)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        sqlx::query(
            "DELETE FROM checkin_log WHERE id NOT IN (SELECT id FROM checkin_log ORDER BY id DESC LIMIT ?)",
        )
        .bind(LOG_CAP)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Whether the feed already records an admission for this tuple,
    /// settled online or queued earlier. Together with
    /// `has_unsynced_for` this is the device's full duplicate memory.
    pub async fn has_logged_admission_for(
        &self,
        token_hash: &str,
        checkin_type: &str,
        session_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM checkin_log WHERE token_hash = ? AND checkin_type = ? AND session_id IS ? AND status IN ('checked_in', 'already_checked_in') LIMIT 1",
        )
        .bind(token_hash)
        .bind(checkin_type)
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }

    /// Most recent feed entries, newest first.
    pub async fn recent_log(&self, limit: u32) -> Result<Vec<CheckinLogEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, CheckinLogEntry>(
            "SELECT * FROM checkin_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(entries)
    }

    /// Retroactively rewrite a queued entry's feed status once the server
    /// has classified it (e.g. `already_checked_in` after a cross-device
    /// race the device could not see).
    pub async fn update_log_status_by_nonce(
        &self,
        nonce: &str,
        status: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE checkin_log SET status = ? WHERE nonce = ?")
            .bind(status)
            .bind(nonce)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
