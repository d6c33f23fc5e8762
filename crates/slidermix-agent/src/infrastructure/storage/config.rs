//! TOML-based runtime configuration for the agent.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\SliderMix\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/slidermix/config.toml` or `~/.config/slidermix/config.toml`
//! - macOS:    `~/Library/Application Support/SliderMix/config.toml`
//!
//! The settings snapshot (`settings.json`, see [`super::settings_store`]) lives
//! next to it in the same directory.
//!
//! # What goes in this file? (for beginners)
//!
//! `config.toml` holds how the agent *runs*: which serial port, how fast the
//! drain loop ticks, how long a resolver call may take.  User choices made
//! while the agent runs (slider assignments, cached volumes) belong to the
//! settings snapshot instead.  Example:
//!
//! ```toml
//! [agent]
//! log_level = "debug"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [routing]
//! drain_interval_ms = 10
//! ```
//!
//! Every field carries a `#[serde(default = "...")]`, so a missing file, a
//! missing section, or a missing key all fall back to the reference values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level runtime configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// General agent behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Schema version string – bump when breaking changes are introduced.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Route to the in-memory audio backend instead of the host's.
    #[serde(default)]
    pub dry_run: bool,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Port to connect to when the settings snapshot has no `last_port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Blocking read timeout; also bounds how long `disconnect` waits.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Line framer buffer bound in bytes.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// Consecutive read failures before the link is marked faulted.
    #[serde(default = "default_fault_threshold")]
    pub fault_threshold: u32,
}

/// Routing engine and drain loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    /// Number of physical sliders on the controller.
    #[serde(default = "default_slider_count")]
    pub slider_count: usize,
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Upper bound on a single resolver get/set.
    #[serde(default = "default_resolver_timeout_ms")]
    pub resolver_timeout_ms: u64,
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl RoutingConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_read_timeout_ms() -> u64 {
    50
}
fn default_max_line_len() -> usize {
    slidermix_core::DEFAULT_MAX_LINE_LEN
}
fn default_fault_threshold() -> u32 {
    3
}
fn default_slider_count() -> usize {
    slidermix_core::DEFAULT_SLIDER_COUNT
}
fn default_drain_interval_ms() -> u64 {
    20
}
fn default_resolver_timeout_ms() -> u64 {
    80
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            max_line_len: default_max_line_len(),
            fault_threshold: default_fault_threshold(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            slider_count: default_slider_count(),
            drain_interval_ms: default_drain_interval_ms(),
            resolver_timeout_ms: default_resolver_timeout_ms(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for agent files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `SliderMix` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("SliderMix"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("slidermix"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("SliderMix")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
