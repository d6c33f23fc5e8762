//! Command bridge: exposes the agent's user actions to a front-end.
//!
//! Every command is a plain `async fn` taking the shared [`AppState`], so a
//! desktop shell, a tray menu, or a local IPC server can forward its calls
//! here without knowing how the serial link or the routing engine work.
//!
//! # Commands
//!
//! | Command          | Effect                                                   |
//! |------------------|----------------------------------------------------------|
//! | `list_ports`     | Enumerates serial devices                                |
//! | `connect`        | Opens a port (default 9600 baud) and records `last_port` |
//! | `disconnect`     | Closes the link; idempotent                              |
//! | `link_status`    | Current link state and endpoint                          |
//! | `assign`         | Changes what one slider controls, returns its level      |
//! | `slider_levels`  | Target and last-known level of every slider              |
//! | `snapshot`       | The full settings snapshot                               |
//! | `set_dark_mode`  | Stores the theme flag                                    |
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`, so every
//! response has the same JSON shape:
//! `{ success: bool, data: T | null, error: string | null }`.
//! A front-end can always read `result.success` without special-casing errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slidermix_core::{SettingsSnapshot, VolumeTarget};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::application::route_slider::SharedEngine;
use crate::infrastructure::serial::{LinkManager, LinkState, PortInfo};
use crate::infrastructure::storage::settings_store::SettingsStore;

// ── Shared application state ──────────────────────────────────────────────────

/// State shared between all commands.
///
/// The link manager sits behind an async mutex because `connect` and
/// `disconnect` await the reader task; the routing engine already carries
/// its own lock.
pub struct AppState {
    pub engine: SharedEngine,
    pub link: Mutex<LinkManager>,
    pub settings: Arc<SettingsStore>,
    /// Baud rate used when `connect` is called without one.
    pub default_baud: u32,
}

impl AppState {
    pub fn new(
        engine: SharedEngine,
        link: LinkManager,
        settings: Arc<SettingsStore>,
        default_baud: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            link: Mutex::new(link),
            settings,
            default_baud,
        })
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// DTO for the link state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatusDto {
    /// `"closed"`, `"open"`, or `"faulted"`.
    pub state: String,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
}

/// DTO for one slider row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderDto {
    pub index: usize,
    /// Encoded target (`"[Master Volume]"`, an application name, ...), or `null`.
    pub target: Option<String>,
    pub level: f32,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

fn state_label(state: LinkState) -> String {
    match state {
        LinkState::Closed => "closed",
        LinkState::Open => "open",
        LinkState::Faulted => "faulted",
    }
    .to_string()
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Lists serial devices that `connect` can open.
pub async fn list_ports(state: Arc<AppState>) -> CommandResult<Vec<PortInfo>> {
    let link = state.link.lock().await;
    match link.available_ports() {
        Ok(ports) => CommandResult::ok(ports),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Opens `port` and remembers it as `last_port`.
///
/// # Example (front-end)
/// ```ts
/// await invoke('connect', { port: 'COM3', baud: null });
/// ```
pub async fn connect(state: Arc<AppState>, port: String, baud: Option<u32>) -> CommandResult<()> {
    let baud = baud.unwrap_or(state.default_baud);
    let mut link = state.link.lock().await;
    match link.connect(&port, baud).await {
        Ok(()) => {
            state.settings.set_last_port(&port);
            CommandResult::ok(())
        }
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Closes the link.  Succeeds when already closed.
pub async fn disconnect(state: Arc<AppState>) -> CommandResult<()> {
    let mut link = state.link.lock().await;
    match link.disconnect().await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

pub async fn link_status(state: Arc<AppState>) -> CommandResult<LinkStatusDto> {
    let link = state.link.lock().await;
    let endpoint = link.endpoint();
    CommandResult::ok(LinkStatusDto {
        state: state_label(link.state()),
        port: endpoint.as_ref().map(|(port, _)| port.clone()),
        baud_rate: endpoint.map(|(_, baud)| baud),
    })
}

/// Points slider `index` at `target` (an encoded setting string, or `None`
/// to unassign) and returns the level the slider should now display.
pub async fn assign(
    state: Arc<AppState>,
    index: usize,
    target: Option<String>,
) -> CommandResult<f32> {
    let target = target.as_deref().and_then(VolumeTarget::from_setting);
    let mut engine = state.engine.lock().await;
    match engine.assign(index, target).await {
        Ok(level) => CommandResult::ok(level),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

pub async fn slider_levels(state: Arc<AppState>) -> CommandResult<Vec<SliderDto>> {
    let engine = state.engine.lock().await;
    let targets = engine.assignment().to_settings();
    let dtos = engine
        .displayed_levels()
        .into_iter()
        .zip(targets)
        .enumerate()
        .map(|(index, (level, target))| SliderDto {
            index,
            target,
            level,
        })
        .collect();
    CommandResult::ok(dtos)
}

pub async fn snapshot(state: Arc<AppState>) -> CommandResult<SettingsSnapshot> {
    CommandResult::ok(state.settings.snapshot())
}

pub async fn set_dark_mode(state: Arc<AppState>, enabled: bool) -> CommandResult<()> {
    state.settings.set_dark_mode(enabled);
    CommandResult::ok(())
}

/// Connects at startup if a preferred port is currently plugged in.
///
/// `preferred` (from the command line or config file) is tried before the
/// snapshot's `last_port`.  Returns the port connected to, if any.
pub async fn auto_connect(state: Arc<AppState>, preferred: Option<&str>) -> Option<String> {
    let last_port = state.settings.snapshot().last_port;
    let candidates: Vec<String> = preferred
        .map(str::to_string)
        .into_iter()
        .chain(last_port)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let ports = match state.link.lock().await.available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "cannot enumerate ports for auto-connect");
            return None;
        }
    };

    for candidate in candidates {
        if !ports.iter().any(|p| p.port_name == candidate) {
            info!(port = %candidate, "preferred port not present");
            continue;
        }
        let result = connect(Arc::clone(&state), candidate.clone(), None).await;
        if result.success {
            return Some(candidate);
        }
        warn!(port = %candidate, error = ?result.error, "auto-connect failed");
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolvers::{HostAudio, ResolverSet};
    use crate::application::route_slider::{RoutingEngine, SettingsObserver};
    use crate::infrastructure::audio::mock::MockHostAudio;
    use crate::infrastructure::serial::mock::MockPortOpener;
    use crate::infrastructure::serial::{LinkSettings, PortOpener, DEFAULT_BAUD_RATE};
    use slidermix_core::MASTER_VOLUME_LABEL;

    /// Builds an isolated AppState that never touches the real config directory.
    fn make_state(opener: Arc<MockPortOpener>, initial: SettingsSnapshot) -> Arc<AppState> {
        let host = Arc::new(MockHostAudio::new().with_app("spotify", 0.3));
        let path = std::env::temp_dir()
            .join(format!("slidermix_bridge_{}", std::process::id()))
            .join("settings.json");
        let settings = Arc::new(SettingsStore::new(path, initial));
        let engine = RoutingEngine::new(
            5,
            ResolverSet::for_host(host as Arc<dyn HostAudio>),
            Arc::clone(&settings) as Arc<dyn SettingsObserver>,
        )
        .into_shared();
        let (link, _rx) = LinkManager::new(opener as Arc<dyn PortOpener>, LinkSettings::default());
        AppState::new(engine, link, settings, DEFAULT_BAUD_RATE)
    }

    #[tokio::test]
    async fn test_list_ports_returns_mock_ports() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let state = make_state(opener, SettingsSnapshot::default());

        // Act
        let result = list_ports(state).await;

        // Assert
        assert!(result.success);
        let ports = result.data.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port_name, "COM3");
    }

    #[tokio::test]
    async fn test_connect_records_last_port_and_reports_open() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let state = make_state(Arc::clone(&opener), SettingsSnapshot::default());

        // Act
        let result = connect(Arc::clone(&state), "COM3".to_string(), None).await;
        let status = link_status(Arc::clone(&state)).await.data.unwrap();

        // Assert
        assert!(result.success, "{:?}", result.error);
        assert_eq!(opener.opened(), vec![("COM3".to_string(), 9600)]);
        assert_eq!(status.state, "open");
        assert_eq!(status.port.as_deref(), Some("COM3"));
        assert_eq!(state.settings.snapshot().last_port.as_deref(), Some("COM3"));

        assert!(disconnect(Arc::clone(&state)).await.success);
        assert_eq!(link_status(state).await.data.unwrap().state, "closed");
    }

    #[tokio::test]
    async fn test_connect_unknown_port_fails_without_recording() {
        let opener = Arc::new(MockPortOpener::new());
        let state = make_state(opener, SettingsSnapshot::default());

        let result = connect(Arc::clone(&state), "COM9".to_string(), Some(115_200)).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("COM9"));
        assert_eq!(state.settings.snapshot().last_port, None);
    }

    #[tokio::test]
    async fn test_disconnect_when_closed_succeeds() {
        let state = make_state(Arc::new(MockPortOpener::new()), SettingsSnapshot::default());

        assert!(disconnect(Arc::clone(&state)).await.success);
        assert!(disconnect(state).await.success);
    }

    #[tokio::test]
    async fn test_assign_updates_levels_and_snapshot() {
        // Arrange
        let state = make_state(Arc::new(MockPortOpener::new()), SettingsSnapshot::default());

        // Act
        let spotify = assign(Arc::clone(&state), 1, Some("Spotify".to_string())).await;
        let master = assign(Arc::clone(&state), 0, Some(MASTER_VOLUME_LABEL.to_string())).await;
        let rows = slider_levels(Arc::clone(&state)).await.data.unwrap();
        let snap = snapshot(state).await.data.unwrap();

        // Assert
        assert!((spotify.data.unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(master.data, Some(1.0));
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1].target.as_deref(), Some("Spotify"));
        assert_eq!(rows[0].target.as_deref(), Some(MASTER_VOLUME_LABEL));
        assert_eq!(rows[2].target, None);
        assert_eq!(snap.slider_targets[1].as_deref(), Some("Spotify"));
    }

    #[tokio::test]
    async fn test_assign_out_of_range_is_error() {
        let state = make_state(Arc::new(MockPortOpener::new()), SettingsSnapshot::default());

        let result = assign(state, 7, None).await;

        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_set_dark_mode_is_visible_in_snapshot() {
        let state = make_state(Arc::new(MockPortOpener::new()), SettingsSnapshot::default());

        set_dark_mode(Arc::clone(&state), true).await;

        assert!(snapshot(state).await.data.unwrap().dark_mode);
    }

    #[tokio::test]
    async fn test_auto_connect_uses_last_port_when_present() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("/dev/ttyACM0"));
        let initial = SettingsSnapshot {
            last_port: Some("/dev/ttyACM0".to_string()),
            ..SettingsSnapshot::default()
        };
        let state = make_state(Arc::clone(&opener), initial);

        // Act
        let connected = auto_connect(Arc::clone(&state), Some("/dev/ttyUSB9")).await;

        // Assert
        assert_eq!(connected.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(opener.opened().len(), 1);
        disconnect(state).await;
    }

    #[tokio::test]
    async fn test_auto_connect_without_candidates_stays_closed() {
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let state = make_state(Arc::clone(&opener), SettingsSnapshot::default());

        assert_eq!(auto_connect(state, None).await, None);
        assert!(opener.opened().is_empty());
    }

    #[test]
    fn test_command_result_ok_sets_success_true() {
        let r: CommandResult<i32> = CommandResult::ok(42);
        assert!(r.success);
        assert_eq!(r.data.unwrap(), 42);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_command_result_err_sets_success_false() {
        let r: CommandResult<i32> = CommandResult::err("something went wrong");
        assert!(!r.success);
        assert!(r.data.is_none());
        assert_eq!(r.error.unwrap(), "something went wrong");
    }
}
