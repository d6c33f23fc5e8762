//! Serial link infrastructure: connection lifecycle and the background reader.
//!
//! [`LinkManager`] opens a serial port, runs a blocking reader on Tokio's
//! blocking pool, and pushes every framed line onto an unbounded queue as a
//! [`TaggedLine`].  It never interprets line content; parsing happens in the
//! drain loop.
//!
//! # Read loop
//!
//! The port is opened with a short read timeout (50 ms by default).  A
//! timed-out read is not an error: it is the point at which the loop checks
//! whether `disconnect` has asked it to stop.  Real read errors and zero-byte
//! reads are counted; after `fault_threshold` of them in a row the link is
//! marked [`LinkState::Faulted`] and the reader exits.  Any successful read
//! resets the count.
//!
//! Each connection gets a fresh [`LineFramer`], so a partial line left over
//! from a previous connection can never be glued onto new data.
//!
//! # Testability
//!
//! The transport is opened through the [`PortOpener`] trait.  Production code
//! uses [`transport::SerialPortOpener`]; tests use [`mock::MockPortOpener`].

use std::io::{ErrorKind, Read};
use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};
use std::time::Duration;

use serde::Serialize;
use slidermix_core::{FramerOutput, LineFramer, DEFAULT_MAX_LINE_LEN};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::infrastructure::storage::config::SerialConfig;

pub mod generation;
pub mod mock;
pub mod transport;

pub use generation::LinkGeneration;

/// Default baud rate of the reference controller firmware.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const READ_CHUNK: usize = 256;

/// Error type for serial link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The port could not be opened: missing, busy, or permission denied.
    #[error("serial port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },
    /// The OS port enumeration failed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),
    /// The background reader task panicked or was cancelled.
    #[error("serial reader task failed: {0}")]
    Reader(String),
}

/// Observable state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Closed,
    Open,
    /// Too many consecutive read failures; needs disconnect/connect.
    Faulted,
}

/// One serial device as reported by port enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    /// `"USB"`, `"Bluetooth"`, `"PCI"`, or `"Unknown"`.
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// A framed line and the link generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedLine {
    pub generation: u64,
    pub line: String,
}

/// Opens serial transports and lists available ports.
pub trait PortOpener: Send + Sync {
    /// Opens `port_name` for blocking reads that time out after `read_timeout`.
    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Read + Send>, LinkError>;

    /// Enumerates devices that can be passed to [`open`](Self::open).
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError>;
}

/// Reader tuning taken from the `[serial]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub read_timeout: Duration,
    pub max_line_len: usize,
    pub fault_threshold: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            fault_threshold: 3,
        }
    }
}

impl From<&SerialConfig> for LinkSettings {
    fn from(cfg: &SerialConfig) -> Self {
        Self {
            read_timeout: cfg.read_timeout(),
            max_line_len: cfg.max_line_len,
            fault_threshold: cfg.fault_threshold,
        }
    }
}

/// Lock-free [`LinkState`] shared with the reader thread.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> LinkState {
        match self.0.load(Ordering::Acquire) {
            x if x == LinkState::Open as u8 => LinkState::Open,
            x if x == LinkState::Faulted as u8 => LinkState::Faulted,
            _ => LinkState::Closed,
        }
    }

    fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

struct ActiveLink {
    port_name: String,
    baud_rate: u32,
    running: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// Owns the serial connection and its background reader.
pub struct LinkManager {
    opener: Arc<dyn PortOpener>,
    settings: LinkSettings,
    lines: mpsc::UnboundedSender<TaggedLine>,
    generation: Arc<LinkGeneration>,
    state: Arc<StateCell>,
    active: Option<ActiveLink>,
}

impl LinkManager {
    /// Creates a closed link manager and returns it together with the line receiver.
    pub fn new(
        opener: Arc<dyn PortOpener>,
        settings: LinkSettings,
    ) -> (Self, mpsc::UnboundedReceiver<TaggedLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mgr = Self {
            opener,
            settings,
            lines: tx,
            generation: Arc::new(LinkGeneration::new()),
            state: Arc::new(StateCell::new(LinkState::Closed)),
            active: None,
        };
        (mgr, rx)
    }

    /// Opens `port_name` and starts feeding lines to the queue.
    ///
    /// An existing link is torn down first.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::PortUnavailable`] if the port cannot be opened;
    /// the manager is left closed.
    pub async fn connect(&mut self, port_name: &str, baud_rate: u32) -> Result<(), LinkError> {
        if self.active.is_some() {
            debug!(port = port_name, "replacing existing serial link");
            self.teardown().await?;
        }

        let transport = self
            .opener
            .open(port_name, baud_rate, self.settings.read_timeout)
            .map_err(|e| {
                warn!(port = port_name, error = %e, "serial connect failed");
                e
            })?;

        let generation = self.generation.advance();
        self.state.set(LinkState::Open);

        let running = Arc::new(AtomicBool::new(true));
        let ctx = ReaderContext {
            port_name: port_name.to_string(),
            generation,
            running: Arc::clone(&running),
            state: Arc::clone(&self.state),
            lines: self.lines.clone(),
            max_line_len: self.settings.max_line_len,
            fault_threshold: self.settings.fault_threshold.max(1),
        };
        let reader = tokio::task::spawn_blocking(move || read_loop(transport, ctx));

        self.active = Some(ActiveLink {
            port_name: port_name.to_string(),
            baud_rate,
            running,
            reader,
        });
        info!(port = port_name, baud_rate, generation, "serial link open");
        Ok(())
    }

    /// Stops the reader and closes the port.  A no-op when not connected.
    ///
    /// Returns once the reader has exited, which takes at most one read
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Reader`] if the reader task panicked.  The link
    /// is closed either way.
    pub async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.teardown().await
    }

    /// `true` while the link is open and the reader is running.
    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Open
    }

    pub fn state(&self) -> LinkState {
        self.state.get()
    }

    /// Port and baud rate of the current link, including a faulted one.
    pub fn endpoint(&self) -> Option<(String, u32)> {
        self.active
            .as_ref()
            .map(|link| (link.port_name.clone(), link.baud_rate))
    }

    /// Enumerates serial devices through the opener.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Enumerate`] if the OS query fails.
    pub fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        self.opener.available_ports()
    }

    /// Shared generation counter; lines stamped with an older value are stale.
    pub fn generation(&self) -> Arc<LinkGeneration> {
        Arc::clone(&self.generation)
    }

    async fn teardown(&mut self) -> Result<(), LinkError> {
        let Some(link) = self.active.take() else {
            return Ok(());
        };

        link.running.store(false, Ordering::Release);
        self.generation.advance();
        let joined = link.reader.await;
        self.state.set(LinkState::Closed);
        info!(port = %link.port_name, "serial link closed");

        joined.map_err(|e| LinkError::Reader(e.to_string()))
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        if let Some(link) = &self.active {
            link.running.store(false, Ordering::Release);
        }
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

struct ReaderContext {
    port_name: String,
    generation: u64,
    running: Arc<AtomicBool>,
    state: Arc<StateCell>,
    lines: mpsc::UnboundedSender<TaggedLine>,
    max_line_len: usize,
    fault_threshold: u32,
}

/// The blocking loop executed on the reader thread.
fn read_loop(mut transport: Box<dyn Read + Send>, ctx: ReaderContext) {
    let mut framer = LineFramer::with_max_line_len(ctx.max_line_len);
    let mut buf = [0u8; READ_CHUNK];
    let mut failures: u32 = 0;

    while ctx.running.load(Ordering::Acquire) {
        match transport.read(&mut buf) {
            Ok(0) => {
                failures += 1;
                warn!(port = %ctx.port_name, failures, "serial read returned no data");
            }
            Ok(n) => {
                failures = 0;
                for output in framer.feed(&buf[..n]) {
                    match output {
                        FramerOutput::Line(line) => {
                            let tagged = TaggedLine {
                                generation: ctx.generation,
                                line,
                            };
                            if ctx.lines.send(tagged).is_err() {
                                warn!(port = %ctx.port_name, "line queue closed, reader stopping");
                                ctx.state.set(LinkState::Closed);
                                return;
                            }
                        }
                        FramerOutput::LineTooLong { dropped } => {
                            warn!(port = %ctx.port_name, dropped, "discarded overlong line");
                        }
                    }
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                failures += 1;
                warn!(port = %ctx.port_name, error = %e, failures, "serial read failed");
            }
        }

        if failures >= ctx.fault_threshold {
            error!(
                port = %ctx.port_name,
                failures,
                "serial link faulted, reconnect required"
            );
            ctx.state.set(LinkState::Faulted);
            return;
        }
    }
    debug!(port = %ctx.port_name, "serial reader stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::{MockPortOpener, ReadStep};
    use super::*;

    fn make_manager(
        opener: &Arc<MockPortOpener>,
    ) -> (LinkManager, mpsc::UnboundedReceiver<TaggedLine>) {
        LinkManager::new(
            Arc::clone(opener) as Arc<dyn PortOpener>,
            LinkSettings {
                read_timeout: Duration::from_millis(5),
                ..LinkSettings::default()
            },
        )
    }

    async fn wait_for_state(mgr: &LinkManager, state: LinkState) {
        for _ in 0..200 {
            if mgr.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("link never reached {state:?}, still {:?}", mgr.state());
    }

    #[tokio::test]
    async fn test_new_manager_is_closed() {
        let opener = Arc::new(MockPortOpener::new());
        let (mgr, _rx) = make_manager(&opener);

        assert_eq!(mgr.state(), LinkState::Closed);
        assert!(!mgr.is_connected());
        assert_eq!(mgr.endpoint(), None);
    }

    #[tokio::test]
    async fn test_connect_opens_port_and_streams_lines() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let (mut mgr, mut rx) = make_manager(&opener);
        opener.push_bytes("COM3", b"slider0: 1\r\nslid");
        opener.push_bytes("COM3", b"er1: 2\n");

        // Act
        mgr.connect("COM3", 9600).await.unwrap();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        // Assert
        assert!(mgr.is_connected());
        assert_eq!(mgr.endpoint(), Some(("COM3".to_string(), 9600)));
        assert_eq!(first.line, "slider0: 1");
        assert_eq!(second.line, "slider1: 2");
        assert_eq!(first.generation, mgr.generation().current());
        mgr.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_missing_port_is_port_unavailable() {
        let opener = Arc::new(MockPortOpener::new());
        let (mut mgr, _rx) = make_manager(&opener);

        let result = mgr.connect("COM9", 9600).await;

        assert!(matches!(result, Err(LinkError::PortUnavailable { .. })));
        assert_eq!(mgr.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_reader_closes_link_when_line_queue_is_dropped() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let (mut mgr, rx) = make_manager(&opener);
        mgr.connect("COM3", 9600).await.unwrap();
        drop(rx);

        // Act
        opener.push_bytes("COM3", b"slider0: 512\n");
        wait_for_state(&mgr, LinkState::Closed).await;

        // Assert
        assert!(!mgr.is_connected());
        assert!(mgr.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_when_closed_is_noop() {
        let opener = Arc::new(MockPortOpener::new());
        let (mut mgr, _rx) = make_manager(&opener);

        mgr.disconnect().await.unwrap();
        mgr.disconnect().await.unwrap();

        assert_eq!(mgr.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_advances_generation_and_closes() {
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let (mut mgr, _rx) = make_manager(&opener);
        mgr.connect("COM3", 9600).await.unwrap();
        let open_generation = mgr.generation().current();

        mgr.disconnect().await.unwrap();

        assert_eq!(mgr.state(), LinkState::Closed);
        assert!(!mgr.generation().is_current(open_generation));
        assert_eq!(mgr.endpoint(), None);
    }

    #[tokio::test]
    async fn test_connect_while_connected_replaces_link() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("COM3").with_port("COM4"));
        let (mut mgr, _rx) = make_manager(&opener);
        mgr.connect("COM3", 9600).await.unwrap();

        // Act
        mgr.connect("COM4", 115200).await.unwrap();

        // Assert
        assert_eq!(mgr.endpoint(), Some(("COM4".to_string(), 115200)));
        assert_eq!(
            opener.opened(),
            vec![("COM3".to_string(), 9600), ("COM4".to_string(), 115200)]
        );
        mgr.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_three_consecutive_failures_fault_the_link() {
        // Arrange
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let (mut mgr, _rx) = make_manager(&opener);
        opener.push("COM3", ReadStep::Error(ErrorKind::BrokenPipe));
        opener.push("COM3", ReadStep::Eof);
        opener.push("COM3", ReadStep::Error(ErrorKind::Other));

        // Act
        mgr.connect("COM3", 9600).await.unwrap();

        // Assert
        wait_for_state(&mgr, LinkState::Faulted).await;
        assert!(!mgr.is_connected());
        assert!(mgr.endpoint().is_some(), "faulted link keeps its endpoint");
        mgr.disconnect().await.unwrap();
        assert_eq!(mgr.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_successful_read_resets_failure_count() {
        // Arrange – two failures, data, two failures: never three in a row
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let (mut mgr, mut rx) = make_manager(&opener);
        opener.push("COM3", ReadStep::Error(ErrorKind::Other));
        opener.push("COM3", ReadStep::Eof);
        opener.push_bytes("COM3", b"ok\n");
        opener.push("COM3", ReadStep::Error(ErrorKind::Other));
        opener.push("COM3", ReadStep::Eof);
        opener.push_bytes("COM3", b"still ok\n");

        // Act
        mgr.connect("COM3", 9600).await.unwrap();
        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();

        // Assert
        assert_eq!((a.line.as_str(), b.line.as_str()), ("ok", "still ok"));
        assert_eq!(mgr.state(), LinkState::Open);
        mgr.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeouts_are_not_failures() {
        let opener = Arc::new(MockPortOpener::new().with_port("COM3"));
        let (mut mgr, _rx) = make_manager(&opener);
        for _ in 0..10 {
            opener.push("COM3", ReadStep::Error(ErrorKind::TimedOut));
        }

        mgr.connect("COM3", 9600).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(mgr.state(), LinkState::Open);
        mgr.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_available_ports_delegates_to_opener() {
        let opener = Arc::new(MockPortOpener::new().with_port("/dev/ttyUSB0"));
        let (mgr, _rx) = make_manager(&opener);

        let ports = mgr.available_ports().unwrap();

        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port_name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_link_settings_from_serial_config() {
        let mut cfg = SerialConfig::default();
        cfg.read_timeout_ms = 20;
        cfg.max_line_len = 64;
        cfg.fault_threshold = 5;

        let settings = LinkSettings::from(&cfg);

        assert_eq!(settings.read_timeout, Duration::from_millis(20));
        assert_eq!(settings.max_line_len, 64);
        assert_eq!(settings.fault_threshold, 5);
    }
}
