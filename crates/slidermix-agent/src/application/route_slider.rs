//! RoutingEngine: turns slider events into volume and brightness changes.
//!
//! This use case is the heart of the agent.  It owns the slider assignment
//! table, the per-application volume cache, and the last level shown for each
//! slider.  Every parsed [`SliderEvent`] ends up in [`RoutingEngine::apply`];
//! every user reassignment in [`RoutingEngine::assign`].
//!
//! # Architecture
//!
//! The engine depends only on traits ([`TargetResolver`] through
//! [`ResolverSet`], and [`SettingsObserver`]) and on domain types from
//! `slidermix-core`.  All infrastructure is injected at construction time,
//! so the engine is fully unit-testable with synthetic events.
//!
//! The engine itself is not synchronized.  The agent wraps it in a
//! [`SharedEngine`] so `assign` (from the command surface) and `apply` (from
//! the drain loop) are serialized.
//!
//! [`SliderEvent`]: slidermix_core::SliderEvent

use std::sync::Arc;
use std::time::Duration;

use slidermix_core::{
    normalize, AssignmentError, RoutingSnapshot, SettingsSnapshot, SliderAssignment,
    VolumeCache, VolumeTarget,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::resolvers::{bounded, ResolveError, ResolverSet};

/// Default upper bound on one resolver call.
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_millis(80);

/// The engine as shared between the drain loop and the command surface.
pub type SharedEngine = Arc<Mutex<RoutingEngine>>;

/// Error type for the routing use case.
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("slider index {index} out of range (controller has {count} sliders)")]
    SliderOutOfRange { index: usize, count: usize },
}

impl From<AssignmentError> for RouteError {
    fn from(e: AssignmentError) -> Self {
        match e {
            AssignmentError::OutOfRange { index, count } => {
                RouteError::SliderOutOfRange { index, count }
            }
        }
    }
}

/// What happened to one event passed to [`RoutingEngine::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The level was written to the target.
    Applied { level: f32 },
    /// The slider index is beyond the assignment table; event dropped.
    OutOfRange,
    /// The slider has no target; event ignored.
    Unassigned,
    /// The target does not currently exist; state left unchanged.
    TargetMissing,
    /// The subsystem failed or timed out; this event was abandoned.
    Failed(ResolveError),
}

/// Receives the routing-owned part of the settings whenever it changes.
///
/// Implementations must not block: `routing_changed` is called with the
/// engine lock held.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsObserver: Send + Sync {
    fn routing_changed(&self, snapshot: RoutingSnapshot);
}

/// Observer that discards every notification.
pub struct NullObserver;

impl SettingsObserver for NullObserver {
    fn routing_changed(&self, _snapshot: RoutingSnapshot) {}
}

/// The routing engine.
pub struct RoutingEngine {
    assignment: SliderAssignment,
    cache: VolumeCache,
    displayed: Vec<f32>,
    resolvers: ResolverSet,
    observer: Arc<dyn SettingsObserver>,
    resolver_timeout: Duration,
}

impl RoutingEngine {
    /// Creates an engine with `slider_count` unassigned sliders and an empty cache.
    pub fn new(
        slider_count: usize,
        resolvers: ResolverSet,
        observer: Arc<dyn SettingsObserver>,
    ) -> Self {
        Self {
            assignment: SliderAssignment::new(slider_count),
            cache: VolumeCache::new(),
            displayed: vec![0.0; slider_count],
            resolvers,
            observer,
            resolver_timeout: DEFAULT_RESOLVER_TIMEOUT,
        }
    }

    /// Restores assignments and cached volumes from a settings snapshot.
    ///
    /// Restored sliders start with a displayed level of 0.0 until the first
    /// event or reassignment; call [`refresh_levels`](Self::refresh_levels)
    /// to seed them from the targets.
    pub fn from_snapshot(
        snapshot: &SettingsSnapshot,
        slider_count: usize,
        resolvers: ResolverSet,
        observer: Arc<dyn SettingsObserver>,
    ) -> Self {
        let mut engine = Self::new(slider_count, resolvers, observer);
        engine.assignment = SliderAssignment::from_settings(&snapshot.slider_targets, slider_count);
        engine.cache = VolumeCache::from_map(&snapshot.app_volumes);
        engine
    }

    /// Overrides the per-call resolver timeout.
    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = timeout;
        self
    }

    /// Wraps the engine for sharing between tasks.
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn slider_count(&self) -> usize {
        self.assignment.len()
    }

    pub fn assignment(&self) -> &SliderAssignment {
        &self.assignment
    }

    pub fn cache(&self) -> &VolumeCache {
        &self.cache
    }

    /// Last-known level of slider `index`, or `None` if out of range.
    pub fn displayed_level(&self, index: usize) -> Option<f32> {
        self.displayed.get(index).copied()
    }

    /// Last-known level of every slider.
    pub fn displayed_levels(&self) -> Vec<f32> {
        self.displayed.clone()
    }

    /// Exports the routing-owned part of the settings snapshot.
    pub fn routing_snapshot(&self) -> RoutingSnapshot {
        RoutingSnapshot {
            slider_targets: self.assignment.to_settings(),
            app_volumes: self.cache.to_map(),
        }
    }

    /// Changes what slider `index` controls and returns its new displayed level.
    ///
    /// The level is read through: for a named application the cache is
    /// consulted first and the live session second; other targets are read
    /// live.  A failed read shows 0.0.  Unassigning shows 0.0.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::SliderOutOfRange`] if `index` is past the table.
    pub async fn assign(
        &mut self,
        index: usize,
        target: Option<VolumeTarget>,
    ) -> Result<f32, RouteError> {
        self.assignment.set(index, target.clone())?;

        let level = match &target {
            None => 0.0,
            Some(target) => self.initial_level(target).await,
        };
        self.displayed[index] = level;

        debug!(
            slider = index,
            target = %target.as_ref().map(VolumeTarget::to_setting).unwrap_or_default(),
            level,
            "slider reassigned"
        );
        self.notify();
        Ok(level)
    }

    /// Re-reads the displayed level of every assigned slider.
    pub async fn refresh_levels(&mut self) {
        let assigned: Vec<(usize, VolumeTarget)> = self
            .assignment
            .assigned()
            .map(|(i, t)| (i, t.clone()))
            .collect();
        for (index, target) in assigned {
            self.displayed[index] = self.initial_level(&target).await;
        }
    }

    /// Applies one raw slider reading.  Never fails; see [`ApplyOutcome`].
    pub async fn apply(&mut self, index: usize, raw_value: u32) -> ApplyOutcome {
        let target = match self.assignment.get(index) {
            Err(_) => {
                debug!(slider = index, "event for unknown slider dropped");
                return ApplyOutcome::OutOfRange;
            }
            Ok(None) => return ApplyOutcome::Unassigned,
            Ok(Some(target)) => target.clone(),
        };

        let level = normalize(raw_value);
        let resolver = self.resolvers.resolver_for(&target);
        let result = bounded(
            self.resolver_timeout,
            resolver.set(target.app_name(), level),
        )
        .await;

        match result {
            Ok(()) => {
                self.displayed[index] = level;
                if let Some(name) = target.app_name() {
                    self.cache.insert(name, level);
                }
                self.notify();
                ApplyOutcome::Applied { level }
            }
            Err(ResolveError::NotFound(reason)) => {
                debug!(slider = index, %target, %reason, "target not present");
                ApplyOutcome::TargetMissing
            }
            Err(e) => {
                warn!(slider = index, %target, error = %e, "failed to apply slider level");
                ApplyOutcome::Failed(e)
            }
        }
    }

    async fn initial_level(&self, target: &VolumeTarget) -> f32 {
        if let Some(cached) = target.app_name().and_then(|name| self.cache.get(name)) {
            return cached;
        }
        let resolver = self.resolvers.resolver_for(target);
        match bounded(self.resolver_timeout, resolver.get(target.app_name())).await {
            Ok(level) => level,
            Err(e) => {
                debug!(%target, error = %e, "could not read initial level");
                0.0
            }
        }
    }

    fn notify(&self) {
        self.observer.routing_changed(self.routing_snapshot());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
