//! HTTP routes for the E-Pass ledger.
//!
//! Three routes carry the whole check-in surface: single-scan verify,
//! offline batch reconciliation, and the device cache refresh payload.
//! Duplicate admission is an expected outcome and always 200-class.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use epass_core::admission::{self, DenyReason, Eligibility, PassLookup, PassStatus};
use epass_core::api::{
    BatchCheckinItem, BatchSyncRequest, BatchSyncResponse, BatchSyncResult, CacheEntryPayload,
    CachePayload, ErrorResponse, EventInfo, PersonInfo, SyncItemStatus, VerifyRequest,
    VerifyResponse, VerifyStatus,
};
use epass_core::db::unix_timestamp;
use epass_crypto::{CodeSigner, hash_token};

use crate::storage::{CheckinOutcome, CheckinParams, DatabaseError, LedgerDatabase, PassRecord};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: LedgerDatabase,
    pub signer: Arc<CodeSigner>,
    /// Static bearer token all terminals present; `None` disables auth
    /// (tests, closed networks).
    pub operator_token: Option<String>,
}

/// Build the ledger router.
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .route("/checkin/verify", post(verify))
        .route("/checkin/batch-sync", post(batch_sync))
        .route("/checkin/epass-cache", get(epass_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn error_response(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
        }),
    )
        .into_response()
}

/// Check the bearer token; the operator never learns whether the token was
/// missing or wrong.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.operator_token else {
        return Ok(());
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED")),
    }
}

/// Operator identity for the check-in audit trail.
fn operator_id(headers: &HeaderMap) -> String {
    headers
        .get("x-operator")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("terminal")
        .to_string()
}

const fn deny_status(reason: DenyReason) -> StatusCode {
    match reason {
        DenyReason::PassNotFound => StatusCode::NOT_FOUND,
        DenyReason::PassInactive | DenyReason::RegistrationNotPaid => StatusCode::FORBIDDEN,
    }
}

/// Resolve a presented credential to a pass.
///
/// A credential is either a raw E-Pass token or an HMAC-signed participant
/// code (the degraded-mode entry path). A verified signature wins; anything
/// else is hashed and looked up as a token. Malformed input resolves to
/// absence, indistinguishable from an unknown token.
async fn resolve_credential(
    state: &AppState,
    presented: &str,
) -> Result<Option<PassRecord>, DatabaseError> {
    if let Some(code) = state.signer.verify(presented) {
        return state.db.lookup_pass_by_code(&code).await;
    }
    match hash_token(presented) {
        Some(token_hash) => state.db.lookup_pass(&token_hash).await,
        None => Ok(None),
    }
}

/// `POST /checkin/verify` — online single-scan path.
async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let record = match resolve_credential(&state, &req.token).await {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, "Pass lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL");
        }
    };

    let lookup = record
        .as_ref()
        .map_or(PassLookup::NotFound, |r| PassLookup::Found(r.status.clone()));

    match admission::evaluate(&lookup) {
        Eligibility::Denied(reason) => {
            info!(reason = %reason, "Admission denied");
            error_response(deny_status(reason), reason.code())
        }
        Eligibility::Admissible => {
            let Some(record) = record else {
                // evaluate() only admits found passes
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL");
            };
            let person_id = record.person_id;
            let status = record.status;
            let operator = operator_id(&headers);
            let params = CheckinParams {
                person_id: &person_id,
                event_id: &status.event_id,
                checkin_type: req.checkin_type.as_str(),
                session_id: req.session_id.as_deref(),
                checked_in_by: &operator,
                nonce: None,
            };
            match state.db.record_checkin(&params).await {
                Ok(outcome) => {
                    let verify_status = match outcome {
                        CheckinOutcome::Admitted => VerifyStatus::CheckedIn,
                        CheckinOutcome::AlreadyAdmitted => VerifyStatus::AlreadyCheckedIn,
                    };
                    info!(
                        person = %person_id,
                        event = %status.event_id,
                        checkin_type = %req.checkin_type,
                        status = ?verify_status,
                        "Check-in recorded"
                    );
                    Json(verify_response(verify_status, &status)).into_response()
                }
                Err(e) => {
                    error!(error = %e, "Check-in write failed");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
                }
            }
        }
    }
}

fn verify_response(status: VerifyStatus, pass: &PassStatus) -> VerifyResponse {
    VerifyResponse {
        status,
        person: PersonInfo {
            name: pass.person_name.clone(),
            korean_name: pass.korean_name.clone(),
        },
        event: EventInfo {
            id: pass.event_id.clone(),
            name: pass.event_name.clone(),
        },
        confirmation_code: pass.confirmation_code.clone(),
    }
}

/// `POST /checkin/batch-sync` — offline reconciliation path.
///
/// One result per input item, correlated by nonce. One item's failure
/// never aborts the batch.
async fn batch_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BatchSyncRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let operator = operator_id(&headers);
    let mut results = Vec::with_capacity(req.checkins.len());
    for item in &req.checkins {
        results.push(sync_one(&state, &operator, item).await);
    }

    info!(items = results.len(), "Batch sync processed");
    Json(BatchSyncResponse { results }).into_response()
}

async fn sync_one(state: &AppState, operator: &str, item: &BatchCheckinItem) -> BatchSyncResult {
    let error_result = |code: &str| BatchSyncResult {
        nonce: item.nonce.clone(),
        status: SyncItemStatus::Error,
        error: Some(code.to_string()),
    };

    let record = match resolve_credential(state, &item.token).await {
        Ok(record) => record,
        Err(e) => {
            error!(nonce = %item.nonce, error = %e, "Batch item lookup failed");
            return error_result("INTERNAL");
        }
    };

    let lookup = record
        .as_ref()
        .map_or(PassLookup::NotFound, |r| PassLookup::Found(r.status.clone()));

    match admission::evaluate(&lookup) {
        Eligibility::Denied(reason) => {
            warn!(nonce = %item.nonce, reason = %reason, "Batch item rejected");
            error_result(reason.code())
        }
        Eligibility::Admissible => {
            let Some(record) = record else {
                return error_result("INTERNAL");
            };
            let params = CheckinParams {
                person_id: &record.person_id,
                event_id: &record.status.event_id,
                checkin_type: item.checkin_type.as_str(),
                session_id: item.session_id.as_deref(),
                checked_in_by: operator,
                nonce: Some(&item.nonce),
            };
            match state.db.record_checkin(&params).await {
                Ok(CheckinOutcome::Admitted) => BatchSyncResult {
                    nonce: item.nonce.clone(),
                    status: SyncItemStatus::CheckedIn,
                    error: None,
                },
                Ok(CheckinOutcome::AlreadyAdmitted) => BatchSyncResult {
                    nonce: item.nonce.clone(),
                    status: SyncItemStatus::AlreadyCheckedIn,
                    error: None,
                },
                Err(e) => {
                    error!(nonce = %item.nonce, error = %e, "Batch item write failed");
                    error_result("INTERNAL")
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheQuery {
    event_id: String,
}

/// `GET /checkin/epass-cache?eventId=…` — full device cache refresh
/// payload for one event.
async fn epass_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CacheQuery>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let rows = match state.db.event_pass_snapshot(&query.event_id).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(event = %query.event_id, error = %e, "Snapshot query failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL");
        }
    };

    let entries: Vec<CacheEntryPayload> = rows
        .into_iter()
        .map(|row| {
            let signed_code = row
                .participant_code
                .as_deref()
                .map(|code| state.signer.sign(code));
            CacheEntryPayload {
                token_hash: row.token_hash,
                participant_code: row.participant_code,
                signed_code,
                person_name: row.person_name,
                korean_name: row.korean_name,
                confirmation_code: row.confirmation_code,
                event_id: row.event_id,
                event_name: row.event_name,
                is_active: row.is_active != 0,
                registration_status: row.registration_status,
            }
        })
        .collect();

    info!(event = %query.event_id, entries = entries.len(), "Cache payload served");
    Json(CachePayload {
        entries,
        cached_at: unix_timestamp(),
    })
    .into_response()
}
