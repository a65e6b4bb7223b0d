#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end scanner tests against a real ledger server: online scans,
//! offline fallback with queueing, batch reconciliation, and the
//! cross-device duplicate scenario.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use epass_core::admission::{CheckinType, DenyReason};
use epass_core::config::ScannerConfig;
use epass_crypto::{CodeSigner, hash_token};
use epass_ledger::routes::{AppState, router};
use epass_ledger::storage::{LedgerDatabase, PassParams};
use epass_scanner::client::LedgerClient;
use epass_scanner::engine::{ScanEngine, ScanFeedback};
use epass_scanner::storage::ScannerDatabase;
use epass_scanner::sync::{Reconciler, SyncError};

const SECRET: &[u8] = b"test-secret-0123456789abcdef";

/// A URL nothing listens on; connections are refused immediately.
const DEAD_URL: &str = "http://127.0.0.1:9";

async fn spawn_ledger() -> (String, LedgerDatabase) {
    let db = LedgerDatabase::open_in_memory().await.unwrap();
    db.create_event("ev-1", "Spring Conference").await.unwrap();

    db.create_person("p-1", "Alice Kim", None).await.unwrap();
    db.create_registration("r-1", "p-1", "ev-1", "PAID", Some("CONF-1"))
        .await
        .unwrap();
    db.create_pass(&PassParams {
        id: "pass-1",
        token_hash: &hash_token("tok-alice").unwrap(),
        person_id: "p-1",
        registration_id: "r-1",
        participant_code: Some("AL12CE"),
    })
    .await
    .unwrap();

    db.create_person("p-2", "Carol Park", None).await.unwrap();
    db.create_registration("r-2", "p-2", "ev-1", "PAID", None)
        .await
        .unwrap();
    db.create_pass(&PassParams {
        id: "pass-2",
        token_hash: &hash_token("tok-carol").unwrap(),
        person_id: "p-2",
        registration_id: "r-2",
        participant_code: None,
    })
    .await
    .unwrap();
    db.set_pass_active("pass-2", false).await.unwrap();

    let state = AppState {
        db: db.clone(),
        signer: Arc::new(CodeSigner::new(SECRET).unwrap()),
        operator_token: None,
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), db)
}

fn client(url: &str) -> LedgerClient {
    LedgerClient::new(url, "test-gate", None, Duration::from_secs(2)).unwrap()
}

fn config() -> ScannerConfig {
    ScannerConfig {
        event_id: Some("ev-1".to_string()),
        batch_size: 10,
        sync_interval_secs: 3600,
        sync_timeout_secs: 10,
        ..ScannerConfig::default()
    }
}

fn engine(db: &ScannerDatabase, url: &str) -> ScanEngine {
    ScanEngine::new(
        db.clone(),
        client(url),
        CodeSigner::new(SECRET).unwrap(),
        CheckinType::Main,
        None,
        Duration::ZERO, // tests drive scans deliberately; no debounce
        Arc::new(Notify::new()),
    )
}

fn reconciler(db: &ScannerDatabase, url: &str) -> Reconciler {
    Reconciler::new(db.clone(), client(url), &config(), Arc::new(Notify::new()))
}

/// Refresh the device cache from the live ledger.
async fn primed_device(url: &str) -> ScannerDatabase {
    let db = ScannerDatabase::open_in_memory().await.unwrap();
    let report = reconciler(&db, url).run_once().await.unwrap().unwrap();
    assert!(report.cache_refreshed);
    db
}

#[tokio::test]
async fn online_scan_admits_then_reports_duplicate() {
    let (url, _ledger) = spawn_ledger().await;
    let db = ScannerDatabase::open_in_memory().await.unwrap();
    let engine = engine(&db, &url);

    let feedback = engine.process_scan("tok-alice").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::Admitted { person_name: "Alice Kim".into(), offline: false }
    );

    let feedback = engine.process_scan("tok-alice").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::AlreadyAdmitted { person_name: "Alice Kim".into(), offline: false }
    );

    // Nothing queued; both scans resolved on the ledger
    assert_eq!(db.count_unsynced().await.unwrap(), 0);
}

#[tokio::test]
async fn offline_scan_queues_then_reconciles() {
    let (url, ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    // Ledger goes away; the scan falls back to the cache and queues
    let offline = engine(&db, DEAD_URL);
    let feedback = offline.process_scan("tok-alice").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::Admitted { person_name: "Alice Kim".into(), offline: true }
    );
    assert_eq!(db.count_unsynced().await.unwrap(), 1);
    assert_eq!(ledger.count_checkins("ev-1").await.unwrap(), 0);

    // Same badge tapped again while still offline: duplicate, not re-queued
    let feedback = offline.process_scan("tok-alice").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::AlreadyAdmitted { person_name: "Alice Kim".into(), offline: true }
    );
    assert_eq!(db.count_unsynced().await.unwrap(), 1);

    // Connectivity returns; the queue drains into the ledger
    let report = reconciler(&db, &url).run_once().await.unwrap().unwrap();
    assert_eq!(report.admitted, 1);
    assert_eq!(db.count_unsynced().await.unwrap(), 0);
    assert_eq!(ledger.count_checkins("ev-1").await.unwrap(), 1);
}

#[tokio::test]
async fn offline_rescan_after_online_admission_is_duplicate() {
    let (url, ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    // Admitted online first; the admission lands in the local feed
    let feedback = engine(&db, &url).process_scan("tok-alice").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::Admitted { person_name: "Alice Kim".into(), offline: false }
    );

    // The ledger drops away and the same badge taps this device again:
    // a repeat, not a fresh admission to queue
    let offline = engine(&db, DEAD_URL);
    let feedback = offline.process_scan("tok-alice").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::AlreadyAdmitted { person_name: "Alice Kim".into(), offline: true }
    );
    assert_eq!(db.count_unsynced().await.unwrap(), 0);
    assert_eq!(ledger.count_checkins("ev-1").await.unwrap(), 1);
}

#[tokio::test]
async fn offline_denies_revoked_pass_after_refresh() {
    let (url, _ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    let offline = engine(&db, DEAD_URL);
    let feedback = offline.process_scan("tok-carol").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::Denied {
            reason: DenyReason::PassInactive,
            person_name: Some("Carol Park".into()),
        }
    );
    assert_eq!(db.count_unsynced().await.unwrap(), 0);
}

#[tokio::test]
async fn offline_unknown_token_is_not_found() {
    let (url, _ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    let offline = engine(&db, DEAD_URL);
    let feedback = offline.process_scan("tok-nobody").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::Denied { reason: DenyReason::PassNotFound, person_name: None }
    );
}

#[tokio::test]
async fn manual_code_entry_works_offline_and_replays() {
    let (url, ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    // The cached signed code stands in for the token at replay time
    let offline = engine(&db, DEAD_URL);
    let feedback = offline.process_code("al12ce").await.unwrap();
    assert_eq!(
        feedback,
        ScanFeedback::Admitted { person_name: "Alice Kim".into(), offline: true }
    );

    let report = reconciler(&db, &url).run_once().await.unwrap().unwrap();
    assert_eq!(report.admitted, 1);
    assert_eq!(ledger.count_checkins("ev-1").await.unwrap(), 1);
}

#[tokio::test]
async fn cross_device_duplicate_is_reclassified_on_sync() {
    let (url, ledger) = spawn_ledger().await;

    // Two devices, both primed, both offline, both admit Alice
    let device_a = primed_device(&url).await;
    let device_b = primed_device(&url).await;
    for db in [&device_a, &device_b] {
        let feedback = engine(db, DEAD_URL).process_scan("tok-alice").await.unwrap();
        assert!(matches!(feedback, ScanFeedback::Admitted { offline: true, .. }));
    }

    // Device A syncs first and wins the race
    let report = reconciler(&device_a, &url).run_once().await.unwrap().unwrap();
    assert_eq!(report.admitted, 1);

    // Device B's entry resolves as a duplicate, and its local feed must
    // stop claiming the admission
    let report = reconciler(&device_b, &url).run_once().await.unwrap().unwrap();
    assert_eq!(report.admitted, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(device_b.count_unsynced().await.unwrap(), 0);

    let feed = device_b.recent_log(1).await.unwrap();
    assert_eq!(feed[0].status, "already_checked_in");

    assert_eq!(ledger.count_checkins("ev-1").await.unwrap(), 1);
}

#[tokio::test]
async fn terminal_rejection_is_settled_not_retried() {
    let (url, _ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    // Queue a scan for a pass revoked after the device went offline: the
    // stale cache admitted it, the ledger must not
    sqlx::query("UPDATE cache_entries SET is_active = 1 WHERE person_name = 'Carol Park'")
        .execute(db.pool())
        .await
        .unwrap();
    let offline = engine(&db, DEAD_URL);
    let feedback = offline.process_scan("tok-carol").await.unwrap();
    assert!(matches!(feedback, ScanFeedback::Admitted { offline: true, .. }));

    let report = reconciler(&db, &url).run_once().await.unwrap().unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.admitted, 0);

    // Settled: the entry will not be resubmitted forever
    assert_eq!(db.count_unsynced().await.unwrap(), 0);
    let feed = db.recent_log(1).await.unwrap();
    assert_eq!(feed[0].status, "denied");
}

#[tokio::test]
async fn transport_failure_leaves_queue_intact() {
    let (url, _ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;

    let offline = engine(&db, DEAD_URL);
    offline.process_scan("tok-alice").await.unwrap();
    assert_eq!(db.count_unsynced().await.unwrap(), 1);

    // Reconciling against a dead ledger settles nothing
    let report = reconciler(&db, DEAD_URL).run_once().await.unwrap().unwrap();
    assert_eq!(report.submitted, 0);
    assert_eq!(db.count_unsynced().await.unwrap(), 1);
}

#[tokio::test]
async fn wedged_sync_round_times_out_and_keeps_queue() {
    let (url, _ledger) = spawn_ledger().await;
    let db = primed_device(&url).await;
    engine(&db, DEAD_URL).process_scan("tok-alice").await.unwrap();

    // A ledger that accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });

    // An on-demand round shares the same per-round budget as the loop
    let config = ScannerConfig { sync_timeout_secs: 0, ..config() };
    let stuck = Reconciler::new(db.clone(), client(&silent), &config, Arc::new(Notify::new()));
    assert!(matches!(stuck.run_once().await, Err(SyncError::RoundTimeout)));

    // Nothing settled; the next round gets the entry back
    assert_eq!(db.count_unsynced().await.unwrap(), 1);
}

#[tokio::test]
async fn debounce_coalesces_identical_scans() {
    let (url, _ledger) = spawn_ledger().await;
    let db = ScannerDatabase::open_in_memory().await.unwrap();
    let engine = ScanEngine::new(
        db.clone(),
        client(&url),
        CodeSigner::new(SECRET).unwrap(),
        CheckinType::Main,
        None,
        Duration::from_secs(30),
        Arc::new(Notify::new()),
    );

    let first = engine.process_scan("tok-alice").await.unwrap();
    assert!(matches!(first, ScanFeedback::Admitted { .. }));

    // Same physical tap delivered twice inside the window
    let second = engine.process_scan("tok-alice").await.unwrap();
    assert_eq!(second, ScanFeedback::Ignored);

    // A different badge is not debounced
    let third = engine.process_scan("tok-carol").await.unwrap();
    assert!(matches!(third, ScanFeedback::Denied { .. }));
}
