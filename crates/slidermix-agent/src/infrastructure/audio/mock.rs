//! In-memory audio backend for unit tests and `--dry-run`.
//!
//! Records every write in call order so tests can assert exactly which
//! subsystem calls an event produced, and lets tests inject failures, missing
//! sessions, and slow responses.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use slidermix_core::clamp_level;

use crate::application::resolvers::{HostAudio, ResolveError};

/// A write recorded by [`MockHostAudio`].
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    SetMaster(f32),
    /// Application name as passed by the caller, and the level.
    SetApp(String, f32),
    SetBrightness(u8),
}

#[derive(Debug)]
struct MockAudioState {
    master: f32,
    /// Keyed by lower-cased name.
    apps: HashMap<String, f32>,
    foreground: Option<String>,
    brightness: u8,
}

/// A recording implementation of [`HostAudio`].
pub struct MockHostAudio {
    state: Mutex<MockAudioState>,
    calls: Mutex<Vec<AudioCall>>,
    should_fail: AtomicBool,
    create_missing_apps: bool,
    delay: Mutex<Option<Duration>>,
}

impl MockHostAudio {
    /// Creates a backend with master at 1.0, brightness 100, no sessions and
    /// no focused application.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockAudioState {
                master: 1.0,
                apps: HashMap::new(),
                foreground: None,
                brightness: 100,
            }),
            calls: Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
            create_missing_apps: false,
            delay: Mutex::new(None),
        }
    }

    /// Backend for `--dry-run`: any application name is accepted and
    /// gains a session on first write.
    pub fn dry_run() -> Self {
        Self {
            create_missing_apps: true,
            ..Self::new()
        }
    }

    /// Adds an audio session.
    pub fn with_app(self, name: &str, level: f32) -> Self {
        self.lock_state().apps.insert(name.to_lowercase(), level);
        self
    }

    /// Sets the foreground application reported by `foreground_app`.
    pub fn set_foreground(&self, name: Option<&str>) {
        self.lock_state().foreground = name.map(str::to_string);
    }

    /// When `true`, every call fails with [`ResolveError::SubsystemFailure`].
    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }

    /// Delays every call by `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().expect("lock poisoned") = delay;
    }

    /// Returns every recorded write in call order.
    pub fn calls(&self) -> Vec<AudioCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Current level of the named session, if it exists.
    pub fn app_level(&self, name: &str) -> Option<f32> {
        self.lock_state().apps.get(&name.to_lowercase()).copied()
    }

    pub fn master_level(&self) -> f32 {
        self.lock_state().master
    }

    pub fn brightness_level(&self) -> u8 {
        self.lock_state().brightness
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockAudioState> {
        self.state.lock().expect("lock poisoned")
    }

    async fn enter(&self) -> Result<(), ResolveError> {
        let delay = *self.delay.lock().expect("lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ResolveError::SubsystemFailure("injected failure".to_string()));
        }
        Ok(())
    }

    fn record(&self, call: AudioCall) {
        tracing::debug!(?call, "mock audio write");
        self.calls.lock().expect("lock poisoned").push(call);
    }
}

impl Default for MockHostAudio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostAudio for MockHostAudio {
    async fn master_volume(&self) -> Result<f32, ResolveError> {
        self.enter().await?;
        Ok(self.lock_state().master)
    }

    async fn set_master_volume(&self, level: f32) -> Result<(), ResolveError> {
        self.enter().await?;
        self.lock_state().master = clamp_level(level);
        self.record(AudioCall::SetMaster(level));
        Ok(())
    }

    async fn app_volume(&self, name: &str) -> Result<f32, ResolveError> {
        self.enter().await?;
        self.lock_state()
            .apps
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| ResolveError::NotFound(format!("no audio session for {name}")))
    }

    async fn set_app_volume(&self, name: &str, level: f32) -> Result<(), ResolveError> {
        self.enter().await?;
        {
            let mut state = self.lock_state();
            let key = name.to_lowercase();
            if !state.apps.contains_key(&key) && !self.create_missing_apps {
                return Err(ResolveError::NotFound(format!("no audio session for {name}")));
            }
            state.apps.insert(key, clamp_level(level));
        }
        self.record(AudioCall::SetApp(name.to_string(), level));
        Ok(())
    }

    async fn foreground_app(&self) -> Result<Option<String>, ResolveError> {
        self.enter().await?;
        Ok(self.lock_state().foreground.clone())
    }

    async fn brightness(&self) -> Result<u8, ResolveError> {
        self.enter().await?;
        Ok(self.lock_state().brightness)
    }

    async fn set_brightness(&self, percent: u8) -> Result<(), ResolveError> {
        self.enter().await?;
        self.lock_state().brightness = percent.min(100);
        self.record(AudioCall::SetBrightness(percent));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_writes_in_order() {
        // Arrange
        let host = MockHostAudio::new().with_app("spotify", 0.5);

        // Act
        host.set_master_volume(0.1).await.unwrap();
        host.set_app_volume("Spotify", 0.2).await.unwrap();
        host.set_brightness(30).await.unwrap();

        // Assert
        assert_eq!(
            host.calls(),
            vec![
                AudioCall::SetMaster(0.1),
                AudioCall::SetApp("Spotify".to_string(), 0.2),
                AudioCall::SetBrightness(30),
            ]
        );
        assert_eq!(host.app_level("SPOTIFY"), Some(0.2));
    }

    #[tokio::test]
    async fn test_mock_unknown_app_is_not_found_and_not_recorded() {
        let host = MockHostAudio::new();
        let result = host.set_app_volume("ghost", 0.5).await;
        assert!(matches!(result, Err(ResolveError::NotFound(_))));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_mock_creates_sessions_on_write() {
        let host = MockHostAudio::dry_run();
        host.set_app_volume("discord", 0.4).await.unwrap();
        assert_eq!(host.app_volume("Discord").await.unwrap(), 0.4);
    }

    #[tokio::test]
    async fn test_mock_failing_mode_rejects_every_call() {
        let host = MockHostAudio::new();
        host.set_failing(true);
        assert!(matches!(
            host.master_volume().await,
            Err(ResolveError::SubsystemFailure(_))
        ));
        assert!(host.set_brightness(10).await.is_err());
        assert!(host.calls().is_empty());
    }
}
