//! Host audio and display backends.
//!
//! Each backend implements [`HostAudio`] for one platform:
//!
//! | Platform | Backend                         | Master / apps        | Focused app            | Brightness            |
//! |----------|---------------------------------|----------------------|------------------------|-----------------------|
//! | Linux    | [`linux::PulseHostAudio`]       | `pactl`              | `xdotool` + `/proc`    | `/sys/class/backlight`|
//! | Windows  | [`windows::WindowsHostAudio`]   | Core Audio           | foreground window      | DDC/CI                |
//! | any      | [`mock::MockHostAudio`]         | in memory            | in memory              | in memory             |
//!
//! Other platforms fall back to the in-memory backend with a warning.

use std::sync::Arc;

use crate::application::resolvers::HostAudio;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

/// Selects the backend for this platform, or the in-memory one for dry runs.
pub fn host_backend(dry_run: bool) -> Arc<dyn HostAudio> {
    if dry_run {
        tracing::info!("dry run: routing to in-memory audio backend");
        return Arc::new(mock::MockHostAudio::dry_run());
    }
    platform_backend()
}

#[cfg(target_os = "linux")]
fn platform_backend() -> Arc<dyn HostAudio> {
    Arc::new(linux::PulseHostAudio::new())
}

#[cfg(target_os = "windows")]
fn platform_backend() -> Arc<dyn HostAudio> {
    Arc::new(windows::WindowsHostAudio::new())
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn platform_backend() -> Arc<dyn HostAudio> {
    tracing::warn!("no audio backend for this platform, using in-memory backend");
    Arc::new(mock::MockHostAudio::dry_run())
}
