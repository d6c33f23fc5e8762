//! Scripted serial transport for unit and integration testing.
//!
//! Allows tests to feed bytes, read errors, and disconnects into a
//! [`LinkManager`](super::LinkManager) without a physical device.  Each port
//! owns a queue of [`ReadStep`]s shared between the test and whichever
//! transport the link currently has open; an empty queue behaves like a quiet
//! device (the read times out).

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{LinkError, PortInfo, PortOpener};

/// One scripted outcome of a blocking read.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// The read returns these bytes.
    Data(Vec<u8>),
    /// The read fails with this error kind.
    Error(ErrorKind),
    /// The read returns zero bytes, as an unplugged device does.
    Eof,
}

type Script = Arc<Mutex<VecDeque<ReadStep>>>;

/// Longest a scripted read sleeps when its queue is empty.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// A mock implementation of [`PortOpener`].
#[derive(Default)]
pub struct MockPortOpener {
    scripts: Mutex<HashMap<String, Script>>,
    unavailable: Mutex<HashSet<String>>,
    opened: Mutex<Vec<(String, u32)>>,
}

impl MockPortOpener {
    /// Creates an opener with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a port that can be opened.
    pub fn with_port(self, port_name: &str) -> Self {
        self.script(port_name);
        self
    }

    /// Makes subsequent opens of `port_name` fail.
    pub fn set_unavailable(&self, port_name: &str, unavailable: bool) {
        let mut set = self.unavailable.lock().expect("lock poisoned");
        if unavailable {
            set.insert(port_name.to_string());
        } else {
            set.remove(port_name);
        }
    }

    /// Queues bytes for the next read on `port_name`.
    pub fn push_bytes(&self, port_name: &str, bytes: &[u8]) {
        self.push(port_name, ReadStep::Data(bytes.to_vec()));
    }

    /// Queues an arbitrary read outcome on `port_name`.
    pub fn push(&self, port_name: &str, step: ReadStep) {
        self.script(port_name)
            .lock()
            .expect("lock poisoned")
            .push_back(step);
    }

    /// Number of scripted reads not yet consumed on `port_name`.
    pub fn pending_steps(&self, port_name: &str) -> usize {
        self.script(port_name).lock().expect("lock poisoned").len()
    }

    /// Every successful `open` call, in order.
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().expect("lock poisoned").clone()
    }

    fn script(&self, port_name: &str) -> Script {
        Arc::clone(
            self.scripts
                .lock()
                .expect("lock poisoned")
                .entry(port_name.to_string())
                .or_default(),
        )
    }
}

impl PortOpener for MockPortOpener {
    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Read + Send>, LinkError> {
        let known = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .contains_key(port_name);
        let blocked = self
            .unavailable
            .lock()
            .expect("lock poisoned")
            .contains(port_name);
        if !known || blocked {
            return Err(LinkError::PortUnavailable {
                port: port_name.to_string(),
                reason: (if blocked { "port busy" } else { "no such port" }).to_string(),
            });
        }

        self.opened
            .lock()
            .expect("lock poisoned")
            .push((port_name.to_string(), baud_rate));
        Ok(Box::new(ScriptedPort {
            script: self.script(port_name),
            idle: read_timeout.min(IDLE_POLL),
        }))
    }

    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        let unavailable = self.unavailable.lock().expect("lock poisoned");
        let mut names: Vec<String> = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .keys()
            .filter(|name| !unavailable.contains(*name))
            .cloned()
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|port_name| PortInfo {
                port_name,
                port_type: "Unknown".to_string(),
                manufacturer: None,
                product: None,
                serial_number: None,
                vid: None,
                pid: None,
            })
            .collect())
    }
}

struct ScriptedPort {
    script: Script,
    idle: Duration,
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let step = self.script.lock().expect("lock poisoned").pop_front();
        match step {
            Some(ReadStep::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    // Leave the remainder for the next read.
                    let rest = bytes.split_off(n);
                    self.script
                        .lock()
                        .expect("lock poisoned")
                        .push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
            Some(ReadStep::Error(kind)) => Err(std::io::Error::new(kind, "scripted read error")),
            Some(ReadStep::Eof) => Ok(0),
            None => {
                std::thread::sleep(self.idle);
                Err(std::io::Error::new(ErrorKind::TimedOut, "scripted timeout"))
            }
        }
    }
}
