//! E-Pass Ledger Server
//!
//! Authoritative source of truth for passes and the append-only check-in
//! log, serving the online verify path and the offline reconciliation
//! protocol over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use epass_core::config::{self, load_config};
use epass_core::tracing_init::init_tracing;
use epass_crypto::CodeSigner;
use epass_ledger::routes::{AppState, router};
use epass_ledger::storage::LedgerDatabase;

#[derive(Parser, Debug)]
#[command(name = "epass-ledger")]
#[command(version, about = "E-Pass ledger server - check-in API and admission log")]
struct Args {
    /// Address to listen on (overrides config).
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to a settings.json overriding the global config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Secret for signing participant codes (rotatable).
    #[arg(
        long,
        env = "EPASS_CODE_SECRET",
        default_value = "dev-secret-change-me-000"
    )]
    code_secret: String,

    /// Static bearer token terminals must present; omit to disable auth.
    #[arg(long, env = "EPASS_OPERATOR_TOKEN")]
    operator_token: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing("epass_ledger=info", args.log_json);

    let cfg = load_config(args.config.as_deref())?;

    let addr: SocketAddr = match args.addr {
        Some(addr) => addr,
        None => cfg.ledger.listen_addr.parse()?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        "Starting epass-ledger"
    );

    let db_path = args
        .db_path
        .or(cfg.ledger.database_path)
        .or_else(|| config::default_database_path("ledger.db"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening ledger database");
    let db = LedgerDatabase::open(&db_path).await?;

    let signer = Arc::new(CodeSigner::new(args.code_secret.as_bytes())?);

    if args.operator_token.is_none() {
        tracing::warn!("Operator auth disabled; all terminals are trusted");
    }

    let state = AppState {
        db,
        signer,
        operator_token: args.operator_token,
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Ledger stopped");
    Ok(())
}
