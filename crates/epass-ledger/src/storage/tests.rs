//! Storage layer tests for the E-Pass ledger.

#![allow(clippy::unwrap_used)]

use epass_core::admission::{self, DenyReason, Eligibility, PassLookup};

use super::db::LedgerDatabase;
use super::queries::{CheckinOutcome, CheckinParams, PassParams};

async fn test_db() -> LedgerDatabase {
    LedgerDatabase::open_in_memory().await.unwrap()
}

/// Seed one paid, active pass and return its token hash.
async fn seed_pass(db: &LedgerDatabase, suffix: &str, status: &str) -> String {
    let person = format!("p-{suffix}");
    let reg = format!("r-{suffix}");
    let pass = format!("pass-{suffix}");
    let hash = format!("hash-{suffix}");

    db.create_person(&person, &format!("Person {suffix}"), Some("홍길동"))
        .await
        .unwrap();
    db.create_registration(&reg, &person, "ev-1", status, Some(&format!("CONF-{suffix}")))
        .await
        .unwrap();
    db.create_pass(&PassParams {
        id: &pass,
        token_hash: &hash,
        person_id: &person,
        registration_id: &reg,
        participant_code: Some(&format!("CODE{suffix}")),
    })
    .await
    .unwrap();

    hash
}

async fn seeded_db() -> LedgerDatabase {
    let db = test_db().await;
    db.create_event("ev-1", "Spring Conference").await.unwrap();
    db
}

fn main_checkin<'a>(person_id: &'a str, nonce: Option<&'a str>) -> CheckinParams<'a> {
    CheckinParams {
        person_id,
        event_id: "ev-1",
        checkin_type: "MAIN",
        session_id: None,
        checked_in_by: "gate-a",
        nonce,
    }
}

// === Pass lookup tests ===

#[tokio::test]
async fn lookup_joined_pass() {
    let db = seeded_db().await;
    let hash = seed_pass(&db, "1", "PAID").await;

    let record = db.lookup_pass(&hash).await.unwrap().unwrap();
    let status = record.status;
    assert_eq!(record.person_id, "p-1");
    assert_eq!(status.person_name, "Person 1");
    assert_eq!(status.korean_name.as_deref(), Some("홍길동"));
    assert_eq!(status.event_name, "Spring Conference");
    assert_eq!(status.confirmation_code.as_deref(), Some("CONF-1"));
    assert!(status.is_active);
}

#[tokio::test]
async fn lookup_by_participant_code_resolves_same_pass() {
    let db = seeded_db().await;
    let hash = seed_pass(&db, "1", "PAID").await;

    let record = db.lookup_pass_by_code("CODE1").await.unwrap().unwrap();
    assert_eq!(record.person_id, "p-1");
    assert_eq!(
        record.status.participant_code.as_deref(),
        db.lookup_pass(&hash)
            .await
            .unwrap()
            .unwrap()
            .status
            .participant_code
            .as_deref()
    );

    assert!(db.lookup_pass_by_code("NOPE").await.unwrap().is_none());
}

#[tokio::test]
async fn lookup_unknown_hash_is_not_found() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    assert!(db.lookup_pass("no-such-hash").await.unwrap().is_none());
}

#[tokio::test]
async fn deactivated_pass_is_found_but_denied() {
    let db = seeded_db().await;
    let hash = seed_pass(&db, "1", "PAID").await;
    db.set_pass_active("pass-1", false).await.unwrap();

    let record = db.lookup_pass(&hash).await.unwrap().unwrap();
    assert_eq!(
        admission::evaluate(&PassLookup::Found(record.status)),
        Eligibility::Denied(DenyReason::PassInactive)
    );
}

#[tokio::test]
async fn unpaid_registration_is_denied() {
    let db = seeded_db().await;
    let hash = seed_pass(&db, "1", "PENDING").await;

    let record = db.lookup_pass(&hash).await.unwrap().unwrap();
    assert_eq!(
        admission::evaluate(&PassLookup::Found(record.status)),
        Eligibility::Denied(DenyReason::RegistrationNotPaid)
    );

    db.set_registration_status("r-1", "PAID").await.unwrap();
    let record = db.lookup_pass(&hash).await.unwrap().unwrap();
    assert_eq!(
        admission::evaluate(&PassLookup::Found(record.status)),
        Eligibility::Admissible
    );
}

// === Uniqueness tests ===

#[tokio::test]
async fn exactly_one_admission_per_tuple() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    let first = db.record_checkin(&main_checkin("p-1", None)).await.unwrap();
    assert_eq!(first, CheckinOutcome::Admitted);

    // Every subsequent attempt conflicts, regardless of operator
    for operator in ["gate-a", "gate-b", "gate-c"] {
        let params = CheckinParams {
            checked_in_by: operator,
            ..main_checkin("p-1", None)
        };
        assert_eq!(
            db.record_checkin(&params).await.unwrap(),
            CheckinOutcome::AlreadyAdmitted
        );
    }

    assert_eq!(db.count_checkins("ev-1").await.unwrap(), 1);
}

#[tokio::test]
async fn distinct_types_do_not_conflict() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    db.record_checkin(&main_checkin("p-1", None)).await.unwrap();

    let dining = CheckinParams {
        checkin_type: "DINING",
        ..main_checkin("p-1", None)
    };
    assert_eq!(
        db.record_checkin(&dining).await.unwrap(),
        CheckinOutcome::Admitted
    );

    assert_eq!(db.count_checkins("ev-1").await.unwrap(), 2);
}

#[tokio::test]
async fn distinct_sessions_do_not_conflict_but_null_sessions_do() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    let session = |sid: Option<&'static str>| CheckinParams {
        checkin_type: "SESSION",
        session_id: sid,
        ..main_checkin("p-1", None)
    };

    assert_eq!(
        db.record_checkin(&session(Some("s-1"))).await.unwrap(),
        CheckinOutcome::Admitted
    );
    assert_eq!(
        db.record_checkin(&session(Some("s-2"))).await.unwrap(),
        CheckinOutcome::Admitted
    );
    assert_eq!(
        db.record_checkin(&session(Some("s-1"))).await.unwrap(),
        CheckinOutcome::AlreadyAdmitted
    );

    // Two NULL-session MAIN admissions still collapse onto one row
    assert_eq!(
        db.record_checkin(&main_checkin("p-1", None)).await.unwrap(),
        CheckinOutcome::Admitted
    );
    assert_eq!(
        db.record_checkin(&main_checkin("p-1", None)).await.unwrap(),
        CheckinOutcome::AlreadyAdmitted
    );
}

// === Idempotency tests ===

#[tokio::test]
async fn same_nonce_replays_as_admitted() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    let first = db
        .record_checkin(&main_checkin("p-1", Some("n-1")))
        .await
        .unwrap();
    assert_eq!(first, CheckinOutcome::Admitted);

    // Replaying the exact same entry reports the same classification and
    // never creates a second row.
    let replay = db
        .record_checkin(&main_checkin("p-1", Some("n-1")))
        .await
        .unwrap();
    assert_eq!(replay, CheckinOutcome::Admitted);
    assert_eq!(db.count_checkins("ev-1").await.unwrap(), 1);
}

#[tokio::test]
async fn different_nonce_for_same_tuple_is_already_admitted() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    db.record_checkin(&main_checkin("p-1", Some("n-1")))
        .await
        .unwrap();

    // Another device queued the same person independently
    let other = db
        .record_checkin(&main_checkin("p-1", Some("n-2")))
        .await
        .unwrap();
    assert_eq!(other, CheckinOutcome::AlreadyAdmitted);

    let record = db.get_checkin_by_nonce("n-1").await.unwrap();
    assert!(record.is_some());
    assert!(db.get_checkin_by_nonce("n-2").await.unwrap().is_none());
}

#[tokio::test]
async fn online_checkin_has_no_nonce() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;

    db.record_checkin(&main_checkin("p-1", None)).await.unwrap();
    let row: (Option<String>,) =
        sqlx::query_as("SELECT nonce FROM checkins WHERE person_id = 'p-1'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert!(row.0.is_none());
}

// === Snapshot tests ===

#[tokio::test]
async fn snapshot_includes_flags_for_offline_symmetry() {
    let db = seeded_db().await;
    seed_pass(&db, "1", "PAID").await;
    seed_pass(&db, "2", "PENDING").await;
    seed_pass(&db, "3", "PAID").await;
    db.set_pass_active("pass-3", false).await.unwrap();

    let rows = db.event_pass_snapshot("ev-1").await.unwrap();
    assert_eq!(rows.len(), 3);

    let by_hash = |h: &str| rows.iter().find(|r| r.token_hash == h).unwrap();
    assert_eq!(by_hash("hash-1").registration_status, "PAID");
    assert_eq!(by_hash("hash-2").registration_status, "PENDING");
    assert_eq!(by_hash("hash-3").is_active, 0);
}

#[tokio::test]
async fn snapshot_is_scoped_to_event() {
    let db = seeded_db().await;
    db.create_event("ev-2", "Autumn Meetup").await.unwrap();
    seed_pass(&db, "1", "PAID").await;

    db.create_person("p-x", "Other Person", None).await.unwrap();
    db.create_registration("r-x", "p-x", "ev-2", "PAID", None)
        .await
        .unwrap();
    db.create_pass(&PassParams {
        id: "pass-x",
        token_hash: "hash-x",
        person_id: "p-x",
        registration_id: "r-x",
        participant_code: None,
    })
    .await
    .unwrap();

    let rows = db.event_pass_snapshot("ev-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].token_hash, "hash-1");
}
