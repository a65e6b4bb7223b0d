//! Database queries for the E-Pass ledger.

use epass_core::admission::PassStatus;
use epass_core::db::unix_timestamp;

use super::db::{DatabaseError, LedgerDatabase};
use super::models::{Checkin, Event, PassJoinRow, Person, Registration, SnapshotRow};

/// A pass found in the ledger: the shared admission-relevant status plus
/// the internal person key the check-in write needs.
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub person_id: String,
    pub status: PassStatus,
}

/// Parameters for issuing a pass.
#[derive(Debug, Clone)]
pub struct PassParams<'a> {
    pub id: &'a str,
    pub token_hash: &'a str,
    pub person_id: &'a str,
    pub registration_id: &'a str,
    pub participant_code: Option<&'a str>,
}

/// Parameters for recording one admission.
#[derive(Debug, Clone)]
pub struct CheckinParams<'a> {
    pub person_id: &'a str,
    pub event_id: &'a str,
    pub checkin_type: &'a str,
    pub session_id: Option<&'a str>,
    pub checked_in_by: &'a str,
    /// Idempotency key, present only for offline-synced admissions.
    pub nonce: Option<&'a str>,
}

/// Result of an admission write.
///
/// `record_checkin` is atomic-insert-or-conflict: the uniqueness index on
/// the check-in tuple is the sole duplicate detector, so concurrent
/// scanners racing on the same person resolve without any locking here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinOutcome {
    Admitted,
    AlreadyAdmitted,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

impl LedgerDatabase {
    // =========================================================================
    // Registration boundary queries (intake lives outside this system)
    // =========================================================================

    /// Create a person.
    pub async fn create_person(
        &self,
        id: &str,
        name: &str,
        korean_name: Option<&str>,
    ) -> Result<Person, DatabaseError> {
        sqlx::query("INSERT INTO persons (id, name, korean_name, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(korean_name)
            .bind(unix_timestamp())
            .execute(self.pool())
            .await?;

        self.get_person(id).await
    }

    /// Get a person by ID.
    pub async fn get_person(&self, id: &str) -> Result<Person, DatabaseError> {
        sqlx::query_as::<_, Person>("SELECT * FROM persons WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Person {id}")))
    }

    /// Create an event.
    pub async fn create_event(&self, id: &str, name: &str) -> Result<Event, DatabaseError> {
        sqlx::query("INSERT INTO events (id, name, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(unix_timestamp())
            .execute(self.pool())
            .await?;

        self.get_event(id).await
    }

    /// Get an event by ID.
    pub async fn get_event(&self, id: &str) -> Result<Event, DatabaseError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Event {id}")))
    }

    /// Create a registration.
    pub async fn create_registration(
        &self,
        id: &str,
        person_id: &str,
        event_id: &str,
        status: &str,
        confirmation_code: Option<&str>,
    ) -> Result<Registration, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO registrations (id, person_id, event_id, status, confirmation_code, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(person_id)
        .bind(event_id)
        .bind(status)
        .bind(confirmation_code)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_registration(id).await
    }

    /// Get a registration by ID.
    pub async fn get_registration(&self, id: &str) -> Result<Registration, DatabaseError> {
        sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Registration {id}")))
    }

    /// Update a registration's payment status.
    pub async fn set_registration_status(
        &self,
        id: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE registrations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    // =========================================================================
    // Pass queries
    // =========================================================================

    /// Issue a pass.
    pub async fn create_pass(&self, params: &PassParams<'_>) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO passes (id, token_hash, person_id, registration_id, participant_code, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(params.id)
        .bind(params.token_hash)
        .bind(params.person_id)
        .bind(params.registration_id)
        .bind(params.participant_code)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Activate or deactivate a pass. Passes are never deleted while their
    /// event is live; revocation flips this flag.
    pub async fn set_pass_active(&self, pass_id: &str, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE passes SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(active))
            .bind(unix_timestamp())
            .bind(pass_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Look up a pass by token hash, joined over registration, person, and
    /// event. Absence is explicit; there is no nullable chain to fall
    /// through.
    pub async fn lookup_pass(
        &self,
        token_hash: &str,
    ) -> Result<Option<PassRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PassJoinRow>(
            "SELECT p.person_id, per.name AS person_name, per.korean_name, \
                    r.confirmation_code, p.participant_code, \
                    r.event_id, e.name AS event_name, p.is_active, \
                    r.status AS registration_status \
             FROM passes p \
             JOIN registrations r ON r.id = p.registration_id \
             JOIN persons per ON per.id = p.person_id \
             JOIN events e ON e.id = r.event_id \
             WHERE p.token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let registration_status = row
                    .registration_status
                    .parse()
                    .map_err(|e: epass_core::Error| DatabaseError::Query(e.to_string()))?;
                Ok(Some(PassRecord {
                    person_id: row.person_id,
                    status: PassStatus {
                        person_name: row.person_name,
                        korean_name: row.korean_name,
                        confirmation_code: row.confirmation_code,
                        participant_code: row.participant_code,
                        event_id: row.event_id,
                        event_name: row.event_name,
                        is_active: row.is_active != 0,
                        registration_status,
                    },
                }))
            }
        }
    }

    /// Look up a pass by its participant code (signed-code entry path).
    pub async fn lookup_pass_by_code(
        &self,
        participant_code: &str,
    ) -> Result<Option<PassRecord>, DatabaseError> {
        let hash: Option<(String,)> =
            sqlx::query_as("SELECT token_hash FROM passes WHERE participant_code = ?")
                .bind(participant_code)
                .fetch_optional(self.pool())
                .await?;

        match hash {
            None => Ok(None),
            Some((token_hash,)) => self.lookup_pass(&token_hash).await,
        }
    }

    // =========================================================================
    // Check-in queries
    // =========================================================================

    /// Record one admission. Atomic insert-or-conflict: a uniqueness
    /// violation on the (person, event, type, session) tuple reports
    /// `AlreadyAdmitted` instead of an error. When the conflicting row was
    /// created by the same nonce, the call is an idempotent replay of an
    /// already-processed offline entry and reports `Admitted` again.
    pub async fn record_checkin(
        &self,
        params: &CheckinParams<'_>,
    ) -> Result<CheckinOutcome, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO checkins (person_id, event_id, checkin_type, session_id, checked_in_by, checked_in_at, nonce) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.person_id)
        .bind(params.event_id)
        .bind(params.checkin_type)
        .bind(params.session_id)
        .bind(params.checked_in_by)
        .bind(unix_timestamp())
        .bind(params.nonce)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(CheckinOutcome::Admitted),
            Err(e) if is_unique_violation(&e) => {
                if let Some(nonce) = params.nonce {
                    let replayed: Option<(i64,)> =
                        sqlx::query_as("SELECT id FROM checkins WHERE nonce = ?")
                            .bind(nonce)
                            .fetch_optional(self.pool())
                            .await?;
                    if replayed.is_some() {
                        return Ok(CheckinOutcome::Admitted);
                    }
                }
                Ok(CheckinOutcome::AlreadyAdmitted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a check-in record by its idempotency nonce.
    pub async fn get_checkin_by_nonce(
        &self,
        nonce: &str,
    ) -> Result<Option<Checkin>, DatabaseError> {
        let checkin = sqlx::query_as::<_, Checkin>("SELECT * FROM checkins WHERE nonce = ?")
            .bind(nonce)
            .fetch_optional(self.pool())
            .await?;

        Ok(checkin)
    }

    /// Count check-ins for an event (statistics read path).
    pub async fn count_checkins(&self, event_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkins WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    // =========================================================================
    // Cache snapshot query
    // =========================================================================

    /// Full pass snapshot for an event, for the device cache refresh.
    ///
    /// Inactive and unpaid passes are included with their flags so the
    /// offline decision path can produce the same denial reasons the
    /// online path would.
    pub async fn event_pass_snapshot(
        &self,
        event_id: &str,
    ) -> Result<Vec<SnapshotRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT p.token_hash, p.participant_code, per.name AS person_name, \
                    per.korean_name, r.confirmation_code, r.event_id, \
                    e.name AS event_name, p.is_active, r.status AS registration_status \
             FROM passes p \
             JOIN registrations r ON r.id = p.registration_id \
             JOIN persons per ON per.id = p.person_id \
             JOIN events e ON e.id = r.event_id \
             WHERE r.event_id = ? \
             ORDER BY p.token_hash",
        )
        .bind(event_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}
