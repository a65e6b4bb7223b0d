//! Data models for E-Pass scanner storage.

use serde::{Deserialize, Serialize};

use epass_core::admission::{PassLookup, PassStatus, RegistrationStatus};

/// One pass snapshot row held on the device.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CacheEntry {
    pub token_hash: String,
    pub participant_code: Option<String>,
    pub signed_code: Option<String>,
    pub person_name: String,
    pub korean_name: Option<String>,
    pub confirmation_code: Option<String>,
    pub event_id: String,
    pub event_name: String,
    pub is_active: i64,
    pub registration_status: String,
    pub cached_at: i64,
}

impl CacheEntry {
    /// View this snapshot row as a pass lookup for the shared decision
    /// function. An unparseable status denies rather than admits.
    pub fn to_lookup(&self) -> PassLookup {
        let Ok(registration_status) = self.registration_status.parse::<RegistrationStatus>()
        else {
            return PassLookup::NotFound;
        };
        PassLookup::Found(PassStatus {
            person_name: self.person_name.clone(),
            korean_name: self.korean_name.clone(),
            confirmation_code: self.confirmation_code.clone(),
            participant_code: self.participant_code.clone(),
            event_id: self.event_id.clone(),
            event_name: self.event_name.clone(),
            is_active: self.is_active != 0,
            registration_status,
        })
    }
}

/// One locally queued admission awaiting reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingCheckin {
    pub id: i64,
    /// Raw token, kept only long enough to replay against the ledger.
    pub token: String,
    pub token_hash: String,
    pub checkin_type: String,
    pub session_id: Option<String>,
    /// Client-generated idempotency key, assigned before any network
    /// attempt.
    pub nonce: String,
    pub created_at: i64,
    pub synced: i64,
}

/// One row of the operator-facing check-in feed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckinLogEntry {
    pub id: i64,
    pub token_hash: String,
    pub display_name: String,
    pub checkin_type: String,
    pub session_id: Option<String>,
    pub status: String,
    pub offline: i64,
    pub nonce: Option<String>,
    pub created_at: i64,
}
