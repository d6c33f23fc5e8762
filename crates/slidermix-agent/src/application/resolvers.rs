//! Target resolvers: one get/set strategy per [`VolumeTarget`] variant.
//!
//! The routing engine never talks to an audio API directly.  It picks the
//! resolver matching the slider's target from a [`ResolverSet`] and calls
//! `get` or `set`.  Resolvers in turn sit on a [`HostAudio`] backend, which is
//! the only code that knows whether it is talking to PulseAudio, Core Audio,
//! or an in-memory mock.
//!
//! ```text
//! RoutingEngine ──► ResolverSet ──► MasterResolver     ─┐
//!                                ├► FocusedAppResolver ─┤
//!                                ├► NamedAppResolver   ─┼─► dyn HostAudio
//!                                └► BrightnessResolver ─┘
//! ```
//!
//! [`ResolveError::NotFound`] is an expected outcome (the application is not
//! playing audio right now) and callers leave state unchanged when they see it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use slidermix_core::{brightness_to_level, level_to_brightness, VolumeTarget};
use thiserror::Error;

/// Error type shared by resolvers and host backends.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    /// The target does not currently exist (no session, no focused window).
    #[error("target not found: {0}")]
    NotFound(String),
    /// The audio or display subsystem rejected the call.
    #[error("subsystem failure: {0}")]
    SubsystemFailure(String),
    /// The call did not complete within the resolver budget.
    #[error("resolver call timed out after {0:?}")]
    Timeout(Duration),
}

/// Capabilities of the host audio and display subsystems.
///
/// Levels are normalized `0.0..=1.0`; brightness is integer percent.
/// Application names are matched case-insensitively by implementations.
#[async_trait]
pub trait HostAudio: Send + Sync {
    /// Reads the default output device's master volume.
    async fn master_volume(&self) -> Result<f32, ResolveError>;
    /// Sets the default output device's master volume.
    async fn set_master_volume(&self, level: f32) -> Result<(), ResolveError>;
    /// Reads the volume of the named application's audio session.
    async fn app_volume(&self, name: &str) -> Result<f32, ResolveError>;
    /// Sets the volume of every audio session owned by the named application.
    async fn set_app_volume(&self, name: &str, level: f32) -> Result<(), ResolveError>;
    /// Process name of the application owning the foreground window.
    async fn foreground_app(&self) -> Result<Option<String>, ResolveError>;
    /// Reads display brightness.
    async fn brightness(&self) -> Result<u8, ResolveError>;
    /// Sets display brightness.
    async fn set_brightness(&self, percent: u8) -> Result<(), ResolveError>;
}

/// Uniform get/set over one kind of target.
///
/// `name` is only meaningful for [`NamedAppResolver`]; the others ignore it.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn get(&self, name: Option<&str>) -> Result<f32, ResolveError>;
    async fn set(&self, name: Option<&str>, level: f32) -> Result<(), ResolveError>;
}

// ── Resolvers ─────────────────────────────────────────────────────────────────

/// System master volume.
pub struct MasterResolver {
    host: Arc<dyn HostAudio>,
}

impl MasterResolver {
    pub fn new(host: Arc<dyn HostAudio>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl TargetResolver for MasterResolver {
    async fn get(&self, _name: Option<&str>) -> Result<f32, ResolveError> {
        self.host.master_volume().await
    }

    async fn set(&self, _name: Option<&str>, level: f32) -> Result<(), ResolveError> {
        self.host.set_master_volume(level).await
    }
}

/// Whatever application owns the foreground window at call time.
///
/// The lookup is live on every call; nothing is cached.
pub struct FocusedAppResolver {
    host: Arc<dyn HostAudio>,
}

impl FocusedAppResolver {
    pub fn new(host: Arc<dyn HostAudio>) -> Self {
        Self { host }
    }

    async fn focused(&self) -> Result<String, ResolveError> {
        self.host
            .foreground_app()
            .await?
            .ok_or_else(|| ResolveError::NotFound("no focused application".to_string()))
    }
}

#[async_trait]
impl TargetResolver for FocusedAppResolver {
    async fn get(&self, _name: Option<&str>) -> Result<f32, ResolveError> {
        let app = self.focused().await?;
        self.host.app_volume(&app).await
    }

    async fn set(&self, _name: Option<&str>, level: f32) -> Result<(), ResolveError> {
        let app = self.focused().await?;
        tracing::trace!(app = %app, level, "focused application resolved");
        self.host.set_app_volume(&app, level).await
    }
}

/// A specific application, by process name.
pub struct NamedAppResolver {
    host: Arc<dyn HostAudio>,
}

impl NamedAppResolver {
    pub fn new(host: Arc<dyn HostAudio>) -> Self {
        Self { host }
    }
}

fn require_name(name: Option<&str>) -> Result<&str, ResolveError> {
    name.ok_or_else(|| ResolveError::NotFound("no application name given".to_string()))
}

#[async_trait]
impl TargetResolver for NamedAppResolver {
    async fn get(&self, name: Option<&str>) -> Result<f32, ResolveError> {
        self.host.app_volume(require_name(name)?).await
    }

    async fn set(&self, name: Option<&str>, level: f32) -> Result<(), ResolveError> {
        self.host.set_app_volume(require_name(name)?, level).await
    }
}

/// Display backlight.  Converts to and from the integer percent scale.
pub struct BrightnessResolver {
    host: Arc<dyn HostAudio>,
}

impl BrightnessResolver {
    pub fn new(host: Arc<dyn HostAudio>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl TargetResolver for BrightnessResolver {
    async fn get(&self, _name: Option<&str>) -> Result<f32, ResolveError> {
        Ok(brightness_to_level(self.host.brightness().await?))
    }

    async fn set(&self, _name: Option<&str>, level: f32) -> Result<(), ResolveError> {
        self.host.set_brightness(level_to_brightness(level)).await
    }
}

// ── ResolverSet ───────────────────────────────────────────────────────────────

/// One resolver per [`VolumeTarget`] variant.
#[derive(Clone)]
pub struct ResolverSet {
    pub master: Arc<dyn TargetResolver>,
    pub focused: Arc<dyn TargetResolver>,
    pub named: Arc<dyn TargetResolver>,
    pub brightness: Arc<dyn TargetResolver>,
}

impl ResolverSet {
    /// Builds the standard resolvers over a single host backend.
    pub fn for_host(host: Arc<dyn HostAudio>) -> Self {
        Self {
            master: Arc::new(MasterResolver::new(Arc::clone(&host))),
            focused: Arc::new(FocusedAppResolver::new(Arc::clone(&host))),
            named: Arc::new(NamedAppResolver::new(Arc::clone(&host))),
            brightness: Arc::new(BrightnessResolver::new(host)),
        }
    }

    /// Returns the resolver for `target`.
    pub fn resolver_for(&self, target: &VolumeTarget) -> &dyn TargetResolver {
        match target {
            VolumeTarget::Master => self.master.as_ref(),
            VolumeTarget::FocusedApplication => self.focused.as_ref(),
            VolumeTarget::NamedApplication(_) => self.named.as_ref(),
            VolumeTarget::Brightness => self.brightness.as_ref(),
        }
    }
}

/// Runs a resolver call with an upper bound on its duration.
///
/// # Errors
///
/// Returns [`ResolveError::Timeout`] if `call` does not finish within `limit`,
/// otherwise whatever `call` returned.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ResolveError>
where
    F: Future<Output = Result<T, ResolveError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ResolveError::Timeout(limit)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
