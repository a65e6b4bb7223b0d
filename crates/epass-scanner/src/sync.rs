//! Batch reconciler: drains the pending queue into the ledger and
//! refreshes the local pass cache.
//!
//! All triggers (fixed interval, on-demand, regained-connectivity nudge)
//! funnel into `run_once`; overlapping invocations coalesce on a
//! `try_lock`ed mutex so two triggers never race on the same queue
//! snapshot. Entries are replayed in enqueue order; correctness under
//! cross-device races comes entirely from the ledger's uniqueness
//! constraint, so ordering across devices does not matter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use epass_core::admission::DenyReason;
use epass_core::api::{BatchCheckinItem, BatchSyncRequest, SyncItemStatus};
use epass_core::config::ScannerConfig;

use crate::client::{ClientError, LedgerClient};
use crate::storage::{DatabaseError, PendingCheckin, ScannerDatabase};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Local store failure: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Ledger request failed: {0}")]
    Ledger(#[from] ClientError),

    /// The round exceeded its time budget. Unsettled entries stay queued
    /// for the next round.
    #[error("Reconciliation round timed out")]
    RoundTimeout,
}

/// What one reconciliation round accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub submitted: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// Items the ledger could not definitively process; left queued.
    pub retried: usize,
    pub cache_refreshed: bool,
}

pub struct Reconciler {
    db: ScannerDatabase,
    client: LedgerClient,
    event_id: Option<String>,
    batch_size: u32,
    interval: Duration,
    round_timeout: Duration,
    notify: Arc<Notify>,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        db: ScannerDatabase,
        client: LedgerClient,
        config: &ScannerConfig,
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            db,
            client,
            event_id: config.event_id.clone(),
            batch_size: config.batch_size,
            interval: Duration::from_secs(config.sync_interval_secs),
            round_timeout: Duration::from_secs(config.sync_timeout_secs),
            notify,
            running: Mutex::new(()),
        }
    }

    /// Handle used to trigger an on-demand round.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// One reconciliation round. Returns `None` when another round holds
    /// the lock (the triggers coalesced).
    ///
    /// Every trigger shares the same per-round time budget, so neither
    /// the background loop nor an on-demand round can wedge the queue.
    pub async fn run_once(&self) -> Result<Option<SyncReport>, SyncError> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Reconciliation already running, trigger coalesced");
            return Ok(None);
        };

        match tokio::time::timeout(self.round_timeout, self.round()).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(SyncError::RoundTimeout),
        }
    }

    async fn round(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        loop {
            let batch = self.db.list_unsynced(self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let request = BatchSyncRequest {
                checkins: batch.iter().filter_map(to_item).collect(),
            };
            if request.checkins.is_empty() {
                // Every entry in this batch is malformed; settle them so
                // the queue cannot wedge.
                self.settle_malformed(&batch, &mut report).await?;
                continue;
            }

            let response = match self.client.batch_sync(&request).await {
                Ok(response) => response,
                Err(e) if e.is_transport() => {
                    // No decision from the ledger; everything stays queued.
                    info!(error = %e, pending = batch.len(), "Sync interrupted, will retry");
                    return Ok(report);
                }
                Err(e) => return Err(e.into()),
            };
            report.submitted += request.checkins.len();

            // Results correlate by nonce; response order is unspecified.
            let by_nonce: HashMap<&str, i64> =
                batch.iter().map(|e| (e.nonce.as_str(), e.id)).collect();

            let mut settled = Vec::new();
            for result in &response.results {
                let Some(&id) = by_nonce.get(result.nonce.as_str()) else {
                    warn!(nonce = %result.nonce, "Sync result for unknown nonce");
                    continue;
                };
                match result.status {
                    SyncItemStatus::CheckedIn => {
                        settled.push(id);
                        report.admitted += 1;
                    }
                    SyncItemStatus::AlreadyCheckedIn => {
                        // Another device won the race; the local feed must
                        // stop claiming this scan admitted the person.
                        settled.push(id);
                        report.duplicates += 1;
                        self.db
                            .update_log_status_by_nonce(&result.nonce, "already_checked_in")
                            .await?;
                    }
                    SyncItemStatus::Error => {
                        let code = result.error.as_deref().unwrap_or("INTERNAL");
                        if DenyReason::from_code(code).is_some() {
                            // Terminal rejection: retrying cannot change the
                            // answer, so stop resubmitting the entry.
                            settled.push(id);
                            report.rejected += 1;
                            warn!(nonce = %result.nonce, code, "Queued admission rejected");
                            self.db
                                .update_log_status_by_nonce(&result.nonce, "denied")
                                .await?;
                        } else {
                            report.retried += 1;
                            warn!(nonce = %result.nonce, code, "Queued admission errored, will retry");
                        }
                    }
                }
            }

            self.db.mark_synced(&settled).await?;
            if settled.is_empty() {
                // Only erroring entries remain; stop before spinning.
                break;
            }
        }

        if let Some(event_id) = &self.event_id {
            match self.refresh_cache(event_id).await {
                Ok(count) => {
                    report.cache_refreshed = true;
                    debug!(event = %event_id, passes = count, "Cache refreshed");
                }
                Err(SyncError::Ledger(e)) if e.is_transport() => {
                    info!(error = %e, "Cache refresh skipped, ledger unreachable");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            submitted = report.submitted,
            admitted = report.admitted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            retried = report.retried,
            "Reconciliation round complete"
        );
        Ok(report)
    }

    /// Pull the full replacement snapshot and swap it in atomically.
    async fn refresh_cache(&self, event_id: &str) -> Result<usize, SyncError> {
        let payload = self.client.fetch_cache(event_id).await?;
        let count = payload.entries.len();
        self.db
            .replace_cache(event_id, &payload.entries, payload.cached_at)
            .await?;
        Ok(count)
    }

    /// Settle queue entries that can no longer be serialized for replay
    /// (corrupt checkin_type). They count as rejected.
    async fn settle_malformed(
        &self,
        batch: &[PendingCheckin],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let ids: Vec<i64> = batch.iter().map(|e| e.id).collect();
        error!(entries = ids.len(), "Dropping malformed queue entries");
        report.rejected += ids.len();
        self.db.mark_synced(&ids).await?;
        Ok(())
    }

    /// Long-running loop: a fixed interval while online plus on-demand
    /// triggers. `run_once` bounds each round, so a wedged round cannot
    /// stall the queue forever.
    pub async fn run_loop(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.notify.notified() => {}
            }
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Reconciliation round failed");
            }
        }
    }
}

fn to_item(entry: &PendingCheckin) -> Option<BatchCheckinItem> {
    let checkin_type = entry.checkin_type.parse().ok()?;
    Some(BatchCheckinItem {
        token: entry.token.clone(),
        checkin_type,
        session_id: entry.session_id.clone(),
        nonce: entry.nonce.clone(),
        timestamp: entry.created_at,
    })
}
