//! Data models for E-Pass ledger storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub korean_name: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Registration {
    pub id: String,
    pub person_id: String,
    pub event_id: String,
    pub status: String,
    pub confirmation_code: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pass {
    pub id: String,
    pub token_hash: String,
    pub person_id: String,
    pub registration_id: String,
    pub participant_code: Option<String>,
    pub is_active: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One row of the append-only check-in log.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Checkin {
    pub id: i64,
    pub person_id: String,
    pub event_id: String,
    pub checkin_type: String,
    pub session_id: Option<String>,
    pub checked_in_by: String,
    pub checked_in_at: i64,
    pub nonce: Option<String>,
}

/// Joined pass/registration/person/event row behind `lookup_pass`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PassJoinRow {
    pub person_id: String,
    pub person_name: String,
    pub korean_name: Option<String>,
    pub confirmation_code: Option<String>,
    pub participant_code: Option<String>,
    pub event_id: String,
    pub event_name: String,
    pub is_active: i64,
    pub registration_status: String,
}

/// One row of the cache refresh payload query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub token_hash: String,
    pub participant_code: Option<String>,
    pub person_name: String,
    pub korean_name: Option<String>,
    pub confirmation_code: Option<String>,
    pub event_id: String,
    pub event_name: String,
    pub is_active: i64,
    pub registration_status: String,
}
