//! DrainLoop: moves queued serial lines through the parser into the engine.
//!
//! Every tick (20 ms by default) the loop takes every line queued since the
//! previous tick, drops the ones produced by a link that has since been
//! closed or replaced, parses the rest, and applies each resulting event to
//! the [`RoutingEngine`](super::route_slider::RoutingEngine) in arrival order.
//! Nothing is coalesced: fifty events for one slider mean fifty `set` calls.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use slidermix_core::{EventParser, ParseOutcome};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use super::route_slider::{ApplyOutcome, SharedEngine};
use crate::infrastructure::serial::{LinkGeneration, TaggedLine};

/// Default drain tick.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Counters for one drained batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Lines taken off the queue.
    pub lines: usize,
    /// Lines discarded because their link is gone.
    pub stale: usize,
    /// Lines that were not protocol traffic or did not fit the integer types.
    pub ignored: usize,
    /// Events that reached a target.
    pub applied: usize,
    /// Events the engine could not apply (out of range, unassigned, missing, failed).
    pub skipped: usize,
}

/// Whether the line queue can still deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Open,
    /// Every sender is gone; no more lines will arrive.
    Closed,
}

/// The periodic drain task.
pub struct DrainLoop {
    lines: mpsc::UnboundedReceiver<TaggedLine>,
    engine: SharedEngine,
    generation: Arc<LinkGeneration>,
    parser: EventParser,
    interval: Duration,
}

impl DrainLoop {
    pub fn new(
        lines: mpsc::UnboundedReceiver<TaggedLine>,
        engine: SharedEngine,
        generation: Arc<LinkGeneration>,
    ) -> Self {
        Self {
            lines,
            engine,
            generation,
            parser: EventParser::new(),
            interval: DEFAULT_DRAIN_INTERVAL,
        }
    }

    /// Overrides the tick interval.  A zero interval falls back to the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Ticks until `running` is cleared or the line queue closes.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "drain loop started");

        while running.load(Ordering::Relaxed) {
            ticker.tick().await;
            let (stats, status) = self.drain_once().await;
            if stats.lines > 0 {
                trace!(?stats, "drained batch");
            }
            if status == QueueStatus::Closed {
                debug!("line queue closed");
                break;
            }
        }
        info!("drain loop stopped");
    }

    /// Processes every line currently queued, then returns.
    pub async fn drain_once(&mut self) -> (DrainStats, QueueStatus) {
        let mut batch = Vec::new();
        let status = loop {
            match self.lines.try_recv() {
                Ok(line) => batch.push(line),
                Err(TryRecvError::Empty) => break QueueStatus::Open,
                Err(TryRecvError::Disconnected) => break QueueStatus::Closed,
            }
        };

        let mut stats = DrainStats {
            lines: batch.len(),
            ..DrainStats::default()
        };
        if batch.is_empty() {
            return (stats, status);
        }

        let mut engine = self.engine.lock().await;
        for tagged in batch {
            if !self.generation.is_current(tagged.generation) {
                stats.stale += 1;
                continue;
            }
            let event = match self.parser.parse(&tagged.line) {
                ParseOutcome::Event(event) => event,
                ParseOutcome::NoMatch => {
                    debug!(line = %tagged.line, "ignoring non-protocol line");
                    stats.ignored += 1;
                    continue;
                }
                ParseOutcome::Dropped => {
                    debug!(line = %tagged.line, "dropping line with oversized number");
                    stats.ignored += 1;
                    continue;
                }
            };
            match engine.apply(event.slider_index, event.raw_value).await {
                ApplyOutcome::Applied { .. } => stats.applied += 1,
                _ => stats.skipped += 1,
            }
        }
        (stats, status)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolvers::{HostAudio, ResolverSet};
    use crate::application::route_slider::{NullObserver, RoutingEngine};
    use crate::infrastructure::audio::mock::{AudioCall, MockHostAudio};
    use slidermix_core::VolumeTarget;

    struct Fixture {
        tx: mpsc::UnboundedSender<TaggedLine>,
        generation: Arc<LinkGeneration>,
        host: Arc<MockHostAudio>,
        drain: DrainLoop,
    }

    async fn fixture() -> Fixture {
        let host = Arc::new(MockHostAudio::new().with_app("spotify", 1.0));
        let mut engine = RoutingEngine::new(
            5,
            ResolverSet::for_host(Arc::clone(&host) as Arc<dyn HostAudio>),
            Arc::new(NullObserver),
        );
        engine.assign(0, Some(VolumeTarget::Master)).await.unwrap();
        engine
            .assign(2, Some(VolumeTarget::named("spotify")))
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(LinkGeneration::new());
        generation.advance();
        let drain = DrainLoop::new(rx, engine.into_shared(), Arc::clone(&generation));
        Fixture {
            tx,
            generation,
            host,
            drain,
        }
    }

    fn line(generation: u64, text: &str) -> TaggedLine {
        TaggedLine {
            generation,
            line: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_drain_applies_events_in_arrival_order() {
        // Arrange
        let mut f = fixture().await;
        let g = f.generation.current();
        f.tx.send(line(g, "slider0: 1023")).unwrap();
        f.tx.send(line(g, "slider0: 0")).unwrap();

        // Act
        let (stats, status) = f.drain.drain_once().await;

        // Assert
        assert_eq!(status, QueueStatus::Open);
        assert_eq!(stats.applied, 2);
        assert_eq!(
            f.host.calls(),
            vec![AudioCall::SetMaster(1.0), AudioCall::SetMaster(0.0)]
        );
    }

    #[tokio::test]
    async fn test_drain_counts_ignored_and_skipped_lines() {
        let mut f = fixture().await;
        let g = f.generation.current();
        for text in ["SliderBox ready", "slider9: 5", "slider1: 5", "slider2: 512"] {
            f.tx.send(line(g, text)).unwrap();
        }

        let (stats, _) = f.drain.drain_once().await;

        assert_eq!(
            stats,
            DrainStats {
                lines: 4,
                stale: 0,
                ignored: 1,
                applied: 1,
                skipped: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_drain_discards_lines_from_previous_link() {
        // Arrange
        let mut f = fixture().await;
        let old = f.generation.current();
        f.tx.send(line(old, "slider0: 100")).unwrap();
        let new = f.generation.advance();
        f.tx.send(line(new, "slider0: 200")).unwrap();

        // Act
        let (stats, _) = f.drain.drain_once().await;

        // Assert
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(f.host.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_reports_closed_queue() {
        let mut f = fixture().await;
        drop(f.tx);

        let (stats, status) = f.drain.drain_once().await;

        assert_eq!(stats, DrainStats::default());
        assert_eq!(status, QueueStatus::Closed);
    }

    #[tokio::test]
    async fn test_run_stops_when_queue_closes() {
        // Arrange
        let f = fixture().await;
        let g = f.generation.current();
        f.tx.send(line(g, "slider0: 512")).unwrap();
        drop(f.tx);
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            f.drain
                .with_interval(Duration::from_millis(1))
                .run(Arc::clone(&running)),
        )
        .await;

        // Assert
        assert!(result.is_ok(), "run must return once the queue is closed");
        assert_eq!(f.host.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_flag_cleared() {
        let f = fixture().await;
        let running = Arc::new(AtomicBool::new(false));

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            f.drain.run(Arc::clone(&running)),
        )
        .await;

        assert!(result.is_ok());
        drop(f.tx);
    }
}
