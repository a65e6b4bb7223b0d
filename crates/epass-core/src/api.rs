//! HTTP wire types for the check-in API.
//!
//! Shared by the ledger's axum handlers and the scanner's HTTP client so
//! the two sides cannot drift. All JSON fields are camelCase.

use serde::{Deserialize, Serialize};

use crate::admission::CheckinType;

/// `POST /checkin/verify` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub token: String,
    pub checkin_type: CheckinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Status of a successful single-scan verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    CheckedIn,
    AlreadyCheckedIn,
}

/// Person display identity returned with a verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub korean_name: Option<String>,
}

/// Event identity returned with a verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub id: String,
    pub name: String,
}

/// `POST /checkin/verify` success response (200).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub status: VerifyStatus,
    pub person: PersonInfo,
    pub event: EventInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
}

/// Error body for non-200 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// One queued offline admission submitted for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCheckinItem {
    pub token: String,
    pub checkin_type: CheckinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub nonce: String,
    /// Unix timestamp of the original offline scan.
    pub timestamp: i64,
}

/// `POST /checkin/batch-sync` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncRequest {
    pub checkins: Vec<BatchCheckinItem>,
}

/// Per-item classification of a batch-sync submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItemStatus {
    CheckedIn,
    AlreadyCheckedIn,
    Error,
}

/// One result per submitted item, correlated by nonce (order is not
/// guaranteed to match the input order).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResult {
    pub nonce: String,
    pub status: SyncItemStatus,
    /// Rejection code when `status` is `error` (`PASS_NOT_FOUND`,
    /// `PASS_INACTIVE`, `REGISTRATION_NOT_PAID`, or `INTERNAL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /checkin/batch-sync` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    pub results: Vec<BatchSyncResult>,
}

/// One pass snapshot row in the cache refresh payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryPayload {
    pub token_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_code: Option<String>,
    pub person_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub korean_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    pub event_id: String,
    pub event_name: String,
    pub is_active: bool,
    pub registration_status: String,
}

/// `GET /checkin/epass-cache` response body: the complete replacement
/// snapshot for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePayload {
    pub entries: Vec<CacheEntryPayload>,
    pub cached_at: i64,
}
