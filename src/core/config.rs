//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.psicash/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PsiCashConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub video_event_buffer: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SimulatorConfig {
    pub starting_balance: Option<i64>,
    pub latency_ms: Option<u64>,
    pub video_reward: Option<u64>,
    pub purchase_duration_secs: Option<i64>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_VIDEO_EVENT_BUFFER: usize = crate::pipeline::DEFAULT_VIDEO_EVENT_BUFFER;
pub const DEFAULT_STARTING_BALANCE: i64 = 0;
pub const DEFAULT_LATENCY_MS: u64 = 250;
pub const DEFAULT_VIDEO_REWARD: u64 = 35;
pub const DEFAULT_PURCHASE_DURATION_SECS: i64 =
    crate::client::simulated::DEFAULT_PURCHASE_DURATION_SECS;

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub video_event_buffer: usize,
    pub starting_balance: i64,
    pub latency_ms: u64,
    pub video_reward: u64,
    pub purchase_duration_secs: i64,
}

impl ResolvedConfig {
    /// Lifetime of an expiring purchase, or `None` if the configured seconds
    /// do not fit a `chrono::Duration`.
    pub fn purchase_duration(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_seconds(self.purchase_duration_secs)
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.psicash/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".psicash").join("config.toml"))
}

/// Load config from `~/.psicash/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `PsiCashConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<PsiCashConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(PsiCashConfig::default());
        }
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<PsiCashConfig, ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(PsiCashConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: PsiCashConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# PsiCash Configuration
# All settings are optional. Defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [pipeline]
# video_event_buffer = 16            # Ad events buffered per video load

# [simulator]
# starting_balance = 0               # Or set PSICASH_STARTING_BALANCE, or pass --balance
# latency_ms = 250                   # Or set PSICASH_LATENCY_MS
# video_reward = 35                  # Credited per watched video
# purchase_duration_secs = 3600      # Lifetime of an expiring purchase
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_balance` is from the `--balance` flag (None = not specified).
pub fn resolve(config: &PsiCashConfig, cli_balance: Option<i64>) -> ResolvedConfig {
    // Starting balance: CLI → env → config → default
    let starting_balance = cli_balance
        .or_else(|| env_override("PSICASH_STARTING_BALANCE"))
        .or(config.simulator.starting_balance)
        .unwrap_or(DEFAULT_STARTING_BALANCE);

    // Latency: env → config → default
    let latency_ms = env_override("PSICASH_LATENCY_MS")
        .or(config.simulator.latency_ms)
        .unwrap_or(DEFAULT_LATENCY_MS);

    ResolvedConfig {
        video_event_buffer: config
            .pipeline
            .video_event_buffer
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_VIDEO_EVENT_BUFFER),
        starting_balance,
        latency_ms,
        video_reward: config
            .simulator
            .video_reward
            .unwrap_or(DEFAULT_VIDEO_REWARD),
        purchase_duration_secs: config
            .simulator
            .purchase_duration_secs
            .unwrap_or(DEFAULT_PURCHASE_DURATION_SECS),
    }
}

/// Reads and parses an env var. Unparseable values are ignored with a warning.
fn env_override<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {name}={raw:?}: not a valid number");
            None
        }
    }
}
