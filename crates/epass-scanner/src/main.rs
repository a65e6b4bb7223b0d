//! E-Pass Scanner Terminal
//!
//! Interactive check-in terminal: reads scans from stdin, resolves each
//! one online against the ledger or offline against the local cache, and
//! keeps a background reconciler draining the pending queue.
//!
//! Input lines are raw E-Pass tokens; commands start with `/`:
//! `/code <CODE>`, `/signed <CODE.TAG>`, `/sync`, `/status`, `/quit`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::info;

use epass_core::admission::CheckinType;
use epass_core::config::{self, load_config};
use epass_core::tracing_init::init_tracing;
use epass_crypto::CodeSigner;
use epass_scanner::client::LedgerClient;
use epass_scanner::engine::{EngineStatus, ScanEngine, ScanFeedback};
use epass_scanner::storage::ScannerDatabase;
use epass_scanner::sync::Reconciler;

/// Per-request timeout for the online verify path. Short on purpose: a
/// slow ledger should feel like an offline ledger at the gate.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "epass-scanner")]
#[command(version, about = "E-Pass check-in terminal - offline-capable scan and sync")]
struct Args {
    /// Ledger base URL (overrides config).
    #[arg(long, env = "EPASS_LEDGER_URL")]
    ledger_url: Option<String>,

    /// Event whose passes this terminal admits.
    #[arg(long, env = "EPASS_EVENT_ID")]
    event_id: Option<String>,

    /// Operator identity recorded with every admission.
    #[arg(long)]
    operator: Option<String>,

    /// Checkpoint kind this terminal records.
    #[arg(long, default_value = "MAIN")]
    checkin_type: CheckinType,

    /// Session ID, required when --checkin-type is SESSION.
    #[arg(long)]
    session_id: Option<String>,

    /// Reconciliation polling interval in seconds (overrides config).
    #[arg(long)]
    sync_interval: Option<u64>,

    /// Max pending entries submitted per sync round (overrides config).
    #[arg(long)]
    batch_size: Option<u32>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to a settings.json overriding the global config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Secret for verifying signed participant codes (matches the ledger's).
    #[arg(
        long,
        env = "EPASS_CODE_SECRET",
        default_value = "dev-secret-change-me-000"
    )]
    code_secret: String,

    /// Bearer token presented to the ledger; omit when auth is disabled.
    #[arg(long, env = "EPASS_OPERATOR_TOKEN")]
    operator_token: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing("epass_scanner=info", args.log_json);

    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(url) = args.ledger_url {
        cfg.scanner.ledger_url = url;
    }
    if let Some(event_id) = args.event_id {
        cfg.scanner.event_id = Some(event_id);
    }
    if let Some(operator) = args.operator {
        cfg.scanner.operator = operator;
    }
    if let Some(secs) = args.sync_interval {
        cfg.scanner.sync_interval_secs = secs;
    }
    if let Some(size) = args.batch_size {
        cfg.scanner.batch_size = size;
    }

    if args.checkin_type == CheckinType::Session && args.session_id.is_none() {
        anyhow::bail!("--session-id is required with --checkin-type SESSION");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        ledger = %cfg.scanner.ledger_url,
        operator = %cfg.scanner.operator,
        "Starting epass-scanner"
    );

    let db_path = args
        .db_path
        .or(cfg.scanner.database_path.clone())
        .or_else(|| config::default_database_path("scanner.db"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening scanner database");
    let db = ScannerDatabase::open(&db_path).await?;

    let client = LedgerClient::new(
        &cfg.scanner.ledger_url,
        &cfg.scanner.operator,
        args.operator_token.as_deref(),
        REQUEST_TIMEOUT,
    )?;
    let signer = CodeSigner::new(args.code_secret.as_bytes())?;

    let notify = Arc::new(Notify::new());
    let engine = ScanEngine::new(
        db.clone(),
        client.clone(),
        signer,
        args.checkin_type,
        args.session_id,
        Duration::from_millis(cfg.scanner.debounce_ms),
        Arc::clone(&notify),
    );
    let reconciler = Arc::new(Reconciler::new(db, client, &cfg.scanner, notify));

    if cfg.scanner.event_id.is_none() {
        tracing::warn!("No event configured; the cache will not refresh");
    }

    let background = Arc::clone(&reconciler);
    tokio::spawn(async move { background.run_loop().await });
    // Prime the cache and drain anything left from a previous run.
    reconciler.trigger().notify_one();

    println!("Ready. Scan a pass, or /code, /signed, /sync, /status, /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_line(line, &engine, &reconciler).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Scanner stopped");
    Ok(())
}

/// Dispatch one input line. Returns false when the operator quits.
async fn handle_line(line: &str, engine: &ScanEngine, reconciler: &Reconciler) -> bool {
    match line.split_once(' ') {
        _ if line == "/quit" => return false,
        _ if line == "/status" => match engine.status().await {
            Ok(status) => print_status(&status),
            Err(e) => println!("  !! status unavailable: {e}"),
        },
        _ if line == "/sync" => match reconciler.run_once().await {
            Ok(Some(report)) => println!(
                "  synced: {} admitted, {} duplicates, {} rejected, {} retried{}",
                report.admitted,
                report.duplicates,
                report.rejected,
                report.retried,
                if report.cache_refreshed { ", cache refreshed" } else { "" },
            ),
            Ok(None) => println!("  sync already in progress"),
            Err(e) => println!("  !! sync failed: {e}"),
        },
        Some(("/code", code)) => feedback(engine.process_code(code).await),
        Some(("/signed", signed)) => feedback(engine.process_signed_code(signed).await),
        _ if line.starts_with('/') => println!("  ?? unknown command: {line}"),
        _ => feedback(engine.process_scan(line).await),
    }
    true
}

/// The three-state operator display: admit, duplicate, deny. A local
/// store failure renders as the deny state; the operator must resync.
fn feedback(result: Result<ScanFeedback, epass_scanner::engine::EngineError>) {
    match result {
        Ok(ScanFeedback::Ignored) => {}
        Ok(ScanFeedback::Admitted { person_name, offline }) => {
            println!("  [ADMIT]     {person_name}{}", offline_tag(offline));
        }
        Ok(ScanFeedback::AlreadyAdmitted { person_name, offline }) => {
            println!("  [DUPLICATE] {person_name}{}", offline_tag(offline));
        }
        Ok(ScanFeedback::Denied { reason, person_name }) => {
            let who = person_name.unwrap_or_default();
            println!("  [DENY]      {} {who}", reason.code());
        }
        Err(e) => {
            println!("  [DENY]      local store error, resync required: {e}");
        }
    }
}

const fn offline_tag(offline: bool) -> &'static str {
    if offline { " (offline)" } else { "" }
}

fn print_status(status: &EngineStatus) {
    println!("  cached passes:    {}", status.cached_passes);
    println!(
        "  cache refreshed:  {}",
        status
            .cache_refreshed_at
            .map_or_else(|| "never".to_string(), |t| t.to_string()),
    );
    println!("  pending unsynced: {}", status.pending_unsynced);
}
