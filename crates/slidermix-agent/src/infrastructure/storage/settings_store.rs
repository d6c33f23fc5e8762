//! JSON persistence for the settings snapshot.
//!
//! [`SettingsStore`] holds the current [`SettingsSnapshot`] in a
//! `tokio::sync::watch` channel.  Changes (from the routing engine through
//! [`SettingsObserver`], or from the command surface) update the channel
//! immediately; a writer task spawned with [`SettingsStore::spawn_writer`]
//! writes the latest value to disk.  Bursts of slider events therefore
//! collapse into a few file writes, and `apply` never waits on the disk.

use std::path::{Path, PathBuf};

use slidermix_core::{RoutingSnapshot, SettingsSnapshot};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::{config_dir, ConfigError};
use crate::application::route_slider::SettingsObserver;

/// Error type for settings snapshot persistence.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings JSON at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Resolves `<config dir>/settings.json`.
///
/// # Errors
///
/// Returns [`SettingsError::Config`] if the platform directory is unknown.
pub fn settings_file_path() -> Result<PathBuf, SettingsError> {
    Ok(config_dir()?.join("settings.json"))
}

/// Reads a snapshot from `path`; a missing file yields the defaults.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system errors other than "not
/// found" and [`SettingsError::Parse`] for malformed JSON.
pub fn load_settings_from(path: &Path) -> Result<SettingsSnapshot, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsSnapshot::default()),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `snapshot` to `path` as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] or [`SettingsError::Serialize`].
pub fn save_settings_to(path: &Path, snapshot: &SettingsSnapshot) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = serde_json::to_string_pretty(snapshot).map_err(SettingsError::Serialize)?;
    std::fs::write(path, content).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Owner of the on-disk settings snapshot.
pub struct SettingsStore {
    path: PathBuf,
    current: watch::Sender<SettingsSnapshot>,
}

impl SettingsStore {
    /// Creates a store for `path` holding `initial`.  Nothing is written yet.
    pub fn new(path: impl Into<PathBuf>, initial: SettingsSnapshot) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            path: path.into(),
            current,
        }
    }

    /// Loads the snapshot at `path` (defaults if absent) and wraps it in a store.
    ///
    /// # Errors
    ///
    /// See [`load_settings_from`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let initial = load_settings_from(&path)?;
        Ok(Self::new(path, initial))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.current.borrow().clone()
    }

    /// Records the port of the last successful connect.
    pub fn set_last_port(&self, port: &str) {
        self.current
            .send_modify(|s| s.last_port = Some(port.to_string()));
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        self.current.send_modify(|s| s.dark_mode = enabled);
    }

    /// Writes the current snapshot synchronously.
    ///
    /// # Errors
    ///
    /// See [`save_settings_to`].
    pub fn flush(&self) -> Result<(), SettingsError> {
        save_settings_to(&self.path, &self.snapshot())
    }

    /// Spawns the task that persists every change.
    ///
    /// The task ends when the store is dropped.  Write failures are logged
    /// and the next change is tried again.
    pub fn spawn_writer(&self) -> JoinHandle<()> {
        let mut rx = self.current.subscribe();
        let path = self.path.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                let target = path.clone();
                let result =
                    tokio::task::spawn_blocking(move || save_settings_to(&target, &snapshot)).await;
                match result {
                    Ok(Ok(())) => debug!(path = %path.display(), "settings saved"),
                    Ok(Err(e)) => warn!(error = %e, "failed to persist settings"),
                    Err(e) => warn!(error = %e, "settings writer panicked"),
                }
            }
        })
    }
}

impl SettingsObserver for SettingsStore {
    fn routing_changed(&self, snapshot: RoutingSnapshot) {
        self.current.send_modify(|s| s.merge_routing(snapshot));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("slidermix_settings_{}_{name}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = temp_path("missing");

        let snapshot = load_settings_from(&path).unwrap();

        assert_eq!(snapshot, SettingsSnapshot::default());
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        // Arrange
        let path = temp_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        // Act
        let result = load_settings_from(&path);

        // Assert
        assert!(matches!(result, Err(SettingsError::Parse { .. })));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_flush_then_open_restores_snapshot() {
        // Arrange
        let path = temp_path("flush");
        let store = SettingsStore::new(&path, SettingsSnapshot::default());
        store.set_last_port("/dev/ttyACM0");
        store.set_dark_mode(true);
        store.routing_changed(RoutingSnapshot {
            slider_targets: vec![Some("[Master Volume]".to_string()), None],
            app_volumes: BTreeMap::from([("spotify".to_string(), 0.25)]),
        });

        // Act
        store.flush().unwrap();
        let reopened = SettingsStore::open(&path).unwrap();

        // Assert
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.last_port.as_deref(), Some("/dev/ttyACM0"));
        assert!(snapshot.dark_mode);
        assert_eq!(snapshot.slider_targets.len(), 2);
        assert_eq!(snapshot.app_volumes.get("spotify"), Some(&0.25));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_routing_change_keeps_non_routing_fields() {
        let store = SettingsStore::new(temp_path("merge"), SettingsSnapshot::default());
        store.set_last_port("COM3");

        store.routing_changed(RoutingSnapshot::default());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.last_port.as_deref(), Some("COM3"));
        assert!(snapshot.slider_targets.is_empty());
    }

    #[tokio::test]
    async fn test_writer_persists_changes() {
        // Arrange
        let path = temp_path("writer");
        let store = SettingsStore::new(&path, SettingsSnapshot::default());
        let writer = store.spawn_writer();

        // Act
        store.set_dark_mode(true);
        let mut persisted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Ok(snapshot) = load_settings_from(&path) {
                if snapshot.dark_mode {
                    persisted = true;
                    break;
                }
            }
        }

        // Assert
        assert!(persisted, "writer should have saved the change");
        drop(store);
        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("writer stops when the store is dropped")
            .unwrap();
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
