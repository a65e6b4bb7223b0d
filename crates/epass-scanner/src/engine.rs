//! Scan engine: the per-device admission state machine.
//!
//! One scan attempt runs `SCANNED -> HASHED -> lookup -> decision ->
//! outcome`. Online, the lookup and the admission write both happen on the
//! ledger; when the ledger is unreachable the same decision runs against
//! the local pass cache and the admission is queued for reconciliation.
//! The operator always gets one of three answers (admit, duplicate, deny)
//! no matter which path resolved the scan.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use epass_core::admission::{self, CheckinType, DenyReason, Eligibility, PassLookup};
use epass_core::api::{VerifyRequest, VerifyStatus};
use epass_crypto::{CodeSigner, hash_token};

use crate::client::{ClientError, LedgerClient};
use crate::storage::{CacheEntry, DatabaseError, PendingParams, ScannerDatabase};

/// Scan engine failures. Only local-store trouble surfaces here; network
/// trouble is routed to the offline path instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Local store failure: {0}")]
    Storage(#[from] DatabaseError),
}

/// What the operator display should show for one scan attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFeedback {
    /// Scan arrived while another was resolving, or repeated the previous
    /// input inside the debounce window. Nothing was recorded.
    Ignored,
    Admitted {
        person_name: String,
        offline: bool,
    },
    AlreadyAdmitted {
        person_name: String,
        offline: bool,
    },
    Denied {
        reason: DenyReason,
        /// Known when the pass resolved but was not admissible; helps the
        /// operator route the person to manual resolution.
        person_name: Option<String>,
    },
}

/// Point-in-time device state for the `/status` display.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub cached_passes: i64,
    pub cache_refreshed_at: Option<i64>,
    pub pending_unsynced: i64,
}

/// The credential a scan attempt carries to the ledger (and into the
/// pending queue for replay). Signed participant codes are full
/// credentials; plaintext codes are not, and must be upgraded via the
/// cache before an admission can be recorded.
enum Credential {
    Token(String),
    SignedCode(String),
}

pub struct ScanEngine {
    db: ScannerDatabase,
    client: LedgerClient,
    signer: CodeSigner,
    checkin_type: CheckinType,
    session_id: Option<String>,
    debounce: Duration,
    sync_nudge: Arc<Notify>,
    busy: Mutex<()>,
    last_input: std::sync::Mutex<Option<(String, Instant)>>,
}

impl ScanEngine {
    pub fn new(
        db: ScannerDatabase,
        client: LedgerClient,
        signer: CodeSigner,
        checkin_type: CheckinType,
        session_id: Option<String>,
        debounce: Duration,
        sync_nudge: Arc<Notify>,
    ) -> Self {
        Self {
            db,
            client,
            signer,
            checkin_type,
            session_id,
            debounce,
            sync_nudge,
            busy: Mutex::new(()),
            last_input: std::sync::Mutex::new(None),
        }
    }

    /// A badge scan: the raw E-Pass token.
    pub async fn process_scan(&self, token: &str) -> Result<ScanFeedback, EngineError> {
        let Some(token_hash) = hash_token(token) else {
            return Ok(ScanFeedback::Denied {
                reason: DenyReason::PassNotFound,
                person_name: None,
            });
        };
        self.process(token, Credential::Token(token.trim().to_string()), &token_hash)
            .await
    }

    /// Manual entry of a plaintext participant code. The code alone is not
    /// a trustworthy credential, so it must resolve through the cache; the
    /// cached signed code then stands in for the token.
    pub async fn process_code(&self, code: &str) -> Result<ScanFeedback, EngineError> {
        let code = code.trim().to_uppercase();
        let Some(entry) = self.db.cache_lookup_by_code(&code).await? else {
            return Ok(ScanFeedback::Denied {
                reason: DenyReason::PassNotFound,
                person_name: None,
            });
        };
        let Some(signed) = entry.signed_code.clone() else {
            // A cache row without a signed code cannot be replayed.
            warn!(code = %code, "Cached pass has no signed code");
            return Ok(ScanFeedback::Denied {
                reason: DenyReason::PassNotFound,
                person_name: Some(entry.person_name.clone()),
            });
        };
        let token_hash = entry.token_hash.clone();
        self.process(&code, Credential::SignedCode(signed), &token_hash)
            .await
    }

    /// A scanned or typed HMAC-signed participant code (`CODE.TAG`).
    /// An invalid signature is indistinguishable from an unknown pass.
    pub async fn process_signed_code(&self, signed: &str) -> Result<ScanFeedback, EngineError> {
        let signed = signed.trim().to_string();
        let Some(code) = self.signer.verify(&signed) else {
            return Ok(ScanFeedback::Denied {
                reason: DenyReason::PassNotFound,
                person_name: None,
            });
        };
        let input = signed.clone();
        let Some(entry) = self.db.cache_lookup_by_code(&code).await? else {
            // Not cached locally; the ledger can still resolve it online.
            return self.process(&input, Credential::SignedCode(signed), "").await;
        };
        let token_hash = entry.token_hash.clone();
        self.process(&input, Credential::SignedCode(signed), &token_hash)
            .await
    }

    /// Device state for the operator `/status` display.
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        Ok(EngineStatus {
            cached_passes: self.db.cache_count().await?,
            cache_refreshed_at: self.db.cache_refreshed_at().await?,
            pending_unsynced: self.db.count_unsynced().await?,
        })
    }

    /// Whether `input` repeats the previous input inside the debounce
    /// window. Updates the window on a fresh input.
    fn debounced(&self, input: &str) -> bool {
        let Ok(mut last) = self.last_input.lock() else {
            return false;
        };
        let now = Instant::now();
        if let Some((prev, at)) = last.as_ref()
            && prev == input
            && now.duration_since(*at) < self.debounce
        {
            return true;
        }
        *last = Some((input.to_string(), now));
        false
    }

    async fn process(
        &self,
        input: &str,
        credential: Credential,
        token_hash: &str,
    ) -> Result<ScanFeedback, EngineError> {
        if self.debounced(input) {
            debug!("Scan coalesced by debounce window");
            return Ok(ScanFeedback::Ignored);
        }
        // One scan resolves at a time; a tap arriving mid-resolution is
        // dropped rather than interleaved.
        let Ok(_busy) = self.busy.try_lock() else {
            debug!("Scan ignored while previous scan resolves");
            return Ok(ScanFeedback::Ignored);
        };

        let presented = match &credential {
            Credential::Token(t) | Credential::SignedCode(t) => t.clone(),
        };

        let request = VerifyRequest {
            token: presented,
            checkin_type: self.checkin_type,
            session_id: self.session_id.clone(),
        };
        match self.client.verify(&request).await {
            Ok(resp) => {
                let status = match resp.status {
                    VerifyStatus::CheckedIn => "checked_in",
                    VerifyStatus::AlreadyCheckedIn => "already_checked_in",
                };
                self.db
                    .append_log(
                        token_hash,
                        &resp.person.name,
                        self.checkin_type.as_str(),
                        self.session_id.as_deref(),
                        status,
                        false,
                        None,
                    )
                    .await?;
                info!(person = %resp.person.name, status, "Online check-in");
                // Online again: nudge the reconciler if anything queued up
                // while we were disconnected.
                if self.db.count_unsynced().await? > 0 {
                    self.sync_nudge.notify_one();
                }
                Ok(match resp.status {
                    VerifyStatus::CheckedIn => ScanFeedback::Admitted {
                        person_name: resp.person.name,
                        offline: false,
                    },
                    VerifyStatus::AlreadyCheckedIn => ScanFeedback::AlreadyAdmitted {
                        person_name: resp.person.name,
                        offline: false,
                    },
                })
            }
            Err(ClientError::Rejected { code, .. }) => {
                let reason = DenyReason::from_code(&code).unwrap_or(DenyReason::PassNotFound);
                let person_name = self.display_name(token_hash).await?;
                self.log_denied(token_hash, person_name.as_deref(), false)
                    .await?;
                info!(reason = %reason, "Online check-in denied");
                Ok(ScanFeedback::Denied {
                    reason,
                    person_name,
                })
            }
            // Anything short of a ledger decision routes to the offline
            // path; the operator must be able to keep scanning.
            Err(e) => {
                debug!(error = %e, "Ledger unreachable, falling back to cache");
                self.admit_offline(&credential, token_hash).await
            }
        }
    }

    async fn admit_offline(
        &self,
        credential: &Credential,
        token_hash: &str,
    ) -> Result<ScanFeedback, EngineError> {
        let entry = self.db.cache_lookup_by_token_hash(token_hash).await?;
        let lookup = entry
            .as_ref()
            .map_or(PassLookup::NotFound, CacheEntry::to_lookup);

        match admission::evaluate(&lookup) {
            Eligibility::Denied(reason) => {
                let person_name = entry.map(|e| e.person_name);
                self.log_denied(token_hash, person_name.as_deref(), true)
                    .await?;
                info!(reason = %reason, "Offline check-in denied");
                Ok(ScanFeedback::Denied {
                    reason,
                    person_name,
                })
            }
            Eligibility::Admissible => {
                let Some(entry) = entry else {
                    // evaluate() only admits cached passes
                    return Ok(ScanFeedback::Denied {
                        reason: DenyReason::PassNotFound,
                        person_name: None,
                    });
                };
                // Same-device duplicate: an admission for this tuple is
                // already queued or already in the feed (admitted online
                // before the network dropped), so this tap is a repeat.
                let checkin_type = self.checkin_type.as_str();
                let session_id = self.session_id.as_deref();
                if self
                    .db
                    .has_unsynced_for(token_hash, checkin_type, session_id)
                    .await?
                    || self
                        .db
                        .has_logged_admission_for(token_hash, checkin_type, session_id)
                        .await?
                {
                    info!(person = %entry.person_name, "Duplicate offline check-in");
                    return Ok(ScanFeedback::AlreadyAdmitted {
                        person_name: entry.person_name,
                        offline: true,
                    });
                }

                // The nonce is fixed before any network attempt so the same
                // logical admission replays with the same idempotency key.
                let nonce = Uuid::new_v4().to_string();
                let replay_credential = match credential {
                    Credential::Token(t) | Credential::SignedCode(t) => t.as_str(),
                };
                self.db
                    .enqueue_pending(&PendingParams {
                        token: replay_credential,
                        token_hash,
                        checkin_type,
                        session_id,
                        nonce: &nonce,
                    })
                    .await?;
                self.db
                    .append_log(
                        token_hash,
                        &entry.person_name,
                        checkin_type,
                        session_id,
                        "checked_in",
                        true,
                        Some(&nonce),
                    )
                    .await?;
                info!(person = %entry.person_name, nonce = %nonce, "Offline check-in queued");
                Ok(ScanFeedback::Admitted {
                    person_name: entry.person_name,
                    offline: true,
                })
            }
        }
    }

    async fn display_name(&self, token_hash: &str) -> Result<Option<String>, EngineError> {
        if token_hash.is_empty() {
            return Ok(None);
        }
        Ok(self
            .db
            .cache_lookup_by_token_hash(token_hash)
            .await?
            .map(|e| e.person_name))
    }

    async fn log_denied(
        &self,
        token_hash: &str,
        person_name: Option<&str>,
        offline: bool,
    ) -> Result<(), EngineError> {
        self.db
            .append_log(
                token_hash,
                person_name.unwrap_or("(unknown)"),
                self.checkin_type.as_str(),
                self.session_id.as_deref(),
                "denied",
                offline,
                None,
            )
            .await?;
        Ok(())
    }
}
