//! Configuration resolution for E-Pass.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/epass/settings.json)
//! 3. Explicit config file (--config)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete E-Pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// Ledger server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub listen_addr: String,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8090".to_string(),
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Scanner device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub ledger_url: String,
    pub event_id: Option<String>,
    pub operator: String,
    pub database_path: Option<PathBuf>,
    /// Fixed reconciliation polling interval while online (seconds).
    pub sync_interval_secs: u64,
    /// Maximum pending entries submitted per batch-sync round.
    pub batch_size: u32,
    /// Window within which identical consecutive scans are coalesced (ms).
    pub debounce_ms: u64,
    /// Per-reconciliation-round timeout (seconds).
    pub sync_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ledger_url: "http://127.0.0.1:8090".to_string(),
            event_id: None,
            operator: "terminal".to_string(),
            database_path: None,
            sync_interval_secs: 30,
            batch_size: 25,
            debounce_ms: 1500,
            sync_timeout_secs: 60,
        }
    }
}

/// One config file's contribution to the hierarchy. Files may state any
/// subset of fields; unset fields fall through to the layer below.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    #[serde(default)]
    ledger: LedgerOverlay,
    #[serde(default)]
    scanner: ScannerOverlay,
}

#[derive(Debug, Default, Deserialize)]
struct LedgerOverlay {
    listen_addr: Option<String>,
    database_path: Option<PathBuf>,
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ScannerOverlay {
    ledger_url: Option<String>,
    event_id: Option<String>,
    operator: Option<String>,
    database_path: Option<PathBuf>,
    sync_interval_secs: Option<u64>,
    batch_size: Option<u32>,
    debounce_ms: Option<u64>,
    sync_timeout_secs: Option<u64>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load explicit config file
    if let Some(path) = explicit_path {
        let explicit = load_config_file(path)?;
        merge_config(&mut config, explicit);
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".epass").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/epass/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("epass").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Default on-disk database path for the given component name
/// (`"ledger.db"` or `"scanner.db"`).
pub fn default_database_path(file_name: &str) -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".epass").join(file_name))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/epass").join(file_name))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("epass").join(file_name))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = file_name;
        None
    }
}

fn load_config_file(path: &Path) -> Result<ConfigOverlay> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigOverlay) {
    let ConfigOverlay { ledger, scanner } = overlay;

    if let Some(v) = ledger.listen_addr {
        base.ledger.listen_addr = v;
    }
    if let Some(v) = ledger.database_path {
        base.ledger.database_path = Some(v);
    }
    if let Some(v) = ledger.log_level {
        base.ledger.log_level = v;
    }

    if let Some(v) = scanner.ledger_url {
        base.scanner.ledger_url = v;
    }
    if let Some(v) = scanner.event_id {
        base.scanner.event_id = Some(v);
    }
    if let Some(v) = scanner.operator {
        base.scanner.operator = v;
    }
    if let Some(v) = scanner.database_path {
        base.scanner.database_path = Some(v);
    }
    if let Some(v) = scanner.sync_interval_secs {
        base.scanner.sync_interval_secs = v;
    }
    if let Some(v) = scanner.batch_size {
        base.scanner.batch_size = v;
    }
    if let Some(v) = scanner.debounce_ms {
        base.scanner.debounce_ms = v;
    }
    if let Some(v) = scanner.sync_timeout_secs {
        base.scanner.sync_timeout_secs = v;
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("EPASS_LEDGER_URL") {
        config.scanner.ledger_url = val;
    }
    if let Ok(val) = std::env::var("EPASS_EVENT_ID") {
        config.scanner.event_id = Some(val);
    }
    if let Ok(val) = std::env::var("EPASS_SYNC_INTERVAL") {
        if let Ok(n) = val.parse() {
            config.scanner.sync_interval_secs = n;
        }
    }
    if let Ok(val) = std::env::var("EPASS_LOG_LEVEL") {
        config.ledger.log_level = val;
    }
}
