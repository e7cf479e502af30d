//! Configuration resolution for sessionmux.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/sessionmux/settings.json`)
//! 3. Explicit config file (if given, replaces the global one)
//! 4. Environment variables (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Complete sessionmux configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub streams: StreamsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stream processor factory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StreamsConfig {
    /// Only materialize a channel for a new session identity when somebody
    /// listens for new stream processors. First messages from unknown
    /// identities are dropped while nobody listens.
    pub require_listener: bool,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `RUST_LOG` filter when the env-var is not set.
    pub filter: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sessionmux_streams=info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(config_file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
        debug!(path = %global_path.display(), "Loaded global config");
    }

    if let Some(path) = config_file {
        config = load_config_file(path)?;
        debug!(path = %path.display(), "Loaded config file");
    }

    apply_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sessionmux").join("settings.json"))
}

/// Read a single JSON config file. Missing sections fall back to defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `SESSIONMUX_*` overrides looked up through `lookup`.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("SESSIONMUX_REQUIRE_LISTENER") {
        match parse_flag(&val) {
            Some(flag) => config.streams.require_listener = flag,
            None => warn!(value = %val, "Ignoring unparseable SESSIONMUX_REQUIRE_LISTENER"),
        }
    }
    if let Some(val) = lookup("SESSIONMUX_LOG_FILTER") {
        config.logging.filter = val;
    }
    if let Some(val) = lookup("SESSIONMUX_LOG_JSON") {
        match parse_flag(&val) {
            Some(flag) => config.logging.json = flag,
            None => warn!(value = %val, "Ignoring unparseable SESSIONMUX_LOG_JSON"),
        }
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
