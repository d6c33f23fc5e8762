//! Volume targets: what a slider controls.

use std::fmt;

/// Settings label for [`VolumeTarget::Master`].
pub const MASTER_VOLUME_LABEL: &str = "[Master Volume]";
/// Settings label for [`VolumeTarget::FocusedApplication`].
pub const FOCUSED_APPLICATION_LABEL: &str = "[Focused Application]";
/// Settings label for [`VolumeTarget::Brightness`].
pub const SCREEN_BRIGHTNESS_LABEL: &str = "[Screen Brightness]";

/// The software-side destination of a slider.
///
/// Two `NamedApplication` targets are equal when their names match
/// case-insensitively, mirroring how audio sessions are looked up.
#[derive(Debug, Clone)]
pub enum VolumeTarget {
    /// System master volume of the default output device.
    Master,
    /// Whichever application owns the foreground window when the event arrives.
    FocusedApplication,
    /// A specific application's audio session, by process name.
    NamedApplication(String),
    /// Display backlight.
    Brightness,
}

impl VolumeTarget {
    /// Builds a named-application target.
    pub fn named(name: impl Into<String>) -> Self {
        VolumeTarget::NamedApplication(name.into())
    }

    /// Decodes one `slider_targets` entry from the settings snapshot.
    ///
    /// Returns `None` for a blank entry (unassigned slider).
    pub fn from_setting(value: &str) -> Option<Self> {
        let value = value.trim();
        match value {
            "" => None,
            MASTER_VOLUME_LABEL => Some(VolumeTarget::Master),
            FOCUSED_APPLICATION_LABEL => Some(VolumeTarget::FocusedApplication),
            SCREEN_BRIGHTNESS_LABEL => Some(VolumeTarget::Brightness),
            name => Some(VolumeTarget::NamedApplication(name.to_string())),
        }
    }

    /// Encodes the target as a `slider_targets` entry.
    pub fn to_setting(&self) -> String {
        match self {
            VolumeTarget::Master => MASTER_VOLUME_LABEL.to_string(),
            VolumeTarget::FocusedApplication => FOCUSED_APPLICATION_LABEL.to_string(),
            VolumeTarget::Brightness => SCREEN_BRIGHTNESS_LABEL.to_string(),
            VolumeTarget::NamedApplication(name) => name.clone(),
        }
    }

    /// Returns the application name for `NamedApplication`.
    pub fn app_name(&self) -> Option<&str> {
        match self {
            VolumeTarget::NamedApplication(name) => Some(name),
            _ => None,
        }
    }
}

impl PartialEq for VolumeTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VolumeTarget::Master, VolumeTarget::Master)
            | (VolumeTarget::FocusedApplication, VolumeTarget::FocusedApplication)
            | (VolumeTarget::Brightness, VolumeTarget::Brightness) => true,
            (VolumeTarget::NamedApplication(a), VolumeTarget::NamedApplication(b)) => {
                names_match(a, b)
            }
            _ => false,
        }
    }
}

impl Eq for VolumeTarget {}

impl fmt::Display for VolumeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_setting())
    }
}

/// Case-insensitive application name comparison.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
