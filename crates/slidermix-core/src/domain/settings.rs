//! Settings snapshot exchanged with the persistence layer.
//!
//! The routing engine never touches the file system.  It is built from a
//! [`SettingsSnapshot`] and exports a [`RoutingSnapshot`] whenever persisted
//! state changes; whoever owns the file merges the two.
//!
//! # JSON shape
//!
//! ```json
//! {
//!   "last_port": "COM3",
//!   "app_volumes": { "spotify": 0.42 },
//!   "slider_targets": ["[Master Volume]", null, "spotify", null, null],
//!   "dark_mode": false
//! }
//! ```
//!
//! Every field is optional on input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::assignment::DEFAULT_SLIDER_COUNT;

/// User preferences persisted across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Serial port used by the last successful connect.
    #[serde(default)]
    pub last_port: Option<String>,

    /// Last-known volume per application name.
    #[serde(default)]
    pub app_volumes: BTreeMap<String, f32>,

    /// Encoded target per slider; `null` means unassigned.
    #[serde(default = "default_slider_targets")]
    pub slider_targets: Vec<Option<String>>,

    /// UI theme preference.  Carried through untouched by the agent.
    #[serde(default)]
    pub dark_mode: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            last_port: None,
            app_volumes: BTreeMap::new(),
            slider_targets: default_slider_targets(),
            dark_mode: false,
        }
    }
}

impl SettingsSnapshot {
    /// Overwrites the routing-owned fields with `routing`.
    pub fn merge_routing(&mut self, routing: RoutingSnapshot) {
        self.app_volumes = routing.app_volumes;
        self.slider_targets = routing.slider_targets;
    }
}

/// The part of the snapshot the routing engine owns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoutingSnapshot {
    pub slider_targets: Vec<Option<String>>,
    pub app_volumes: BTreeMap<String, f32>,
}

fn default_slider_targets() -> Vec<Option<String>> {
    vec![None; DEFAULT_SLIDER_COUNT]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_yields_defaults() {
        let snapshot: SettingsSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snapshot, SettingsSnapshot::default());
        assert_eq!(snapshot.slider_targets.len(), 5);
        assert!(snapshot.slider_targets.iter().all(Option::is_none));
    }

    #[test]
    fn test_parse_full_document() {
        // Arrange
        let json = r#"{
            "last_port": "COM3",
            "app_volumes": { "Spotify": 0.42 },
            "slider_targets": ["[Master Volume]", null, "Spotify"],
            "dark_mode": true
        }"#;

        // Act
        let snapshot: SettingsSnapshot = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(snapshot.last_port.as_deref(), Some("COM3"));
        assert_eq!(snapshot.app_volumes.get("Spotify"), Some(&0.42));
        assert_eq!(snapshot.slider_targets.len(), 3);
        assert_eq!(snapshot.slider_targets[2].as_deref(), Some("Spotify"));
        assert!(snapshot.dark_mode);
    }

    #[test]
    fn test_unassigned_slots_serialize_as_null() {
        let json = serde_json::to_value(SettingsSnapshot::default()).unwrap();
        assert_eq!(
            json["slider_targets"],
            serde_json::json!([null, null, null, null, null])
        );
        assert_eq!(json["last_port"], serde_json::Value::Null);
    }

    #[test]
    fn test_merge_routing_keeps_port_and_theme() {
        let mut snapshot = SettingsSnapshot {
            last_port: Some("/dev/ttyUSB0".to_string()),
            dark_mode: true,
            ..SettingsSnapshot::default()
        };
        let mut volumes = BTreeMap::new();
        volumes.insert("vlc".to_string(), 0.3);

        snapshot.merge_routing(RoutingSnapshot {
            slider_targets: vec![Some("vlc".to_string())],
            app_volumes: volumes.clone(),
        });

        assert_eq!(snapshot.last_port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(snapshot.dark_mode);
        assert_eq!(snapshot.app_volumes, volumes);
        assert_eq!(snapshot.slider_targets, vec![Some("vlc".to_string())]);
    }
}
