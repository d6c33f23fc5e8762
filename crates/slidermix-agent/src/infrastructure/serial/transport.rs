//! Production serial transport backed by the `serialport` crate.

use std::io::Read;
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};

use super::{LinkError, PortInfo, PortOpener};

/// Opens real serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl SerialPortOpener {
    pub fn new() -> Self {
        Self
    }
}

/// An open device, readable from the link's blocking reader.
struct SerialTransport(Box<dyn SerialPort>);

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl PortOpener for SerialPortOpener {
    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn Read + Send>, LinkError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| LinkError::PortUnavailable {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(SerialTransport(port)))
    }

    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        list_serial_ports()
    }
}

/// Enumerates serial devices.
///
/// On macOS only `/dev/cu.*` devices are listed; the `/dev/tty.*` twins block
/// on open waiting for carrier detect.
///
/// # Errors
///
/// Returns [`LinkError::Enumerate`] if the OS query fails.
pub fn list_serial_ports() -> Result<Vec<PortInfo>, LinkError> {
    let ports = serialport::available_ports().map_err(|e| LinkError::Enumerate(e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_listed(&p.port_name))
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                SerialPortType::UsbPort(info) => (
                    "USB",
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                SerialPortType::BluetoothPort => ("Bluetooth", None, None, None, None, None),
                SerialPortType::PciPort => ("PCI", None, None, None, None, None),
                SerialPortType::Unknown => ("Unknown", None, None, None, None, None),
            };
            PortInfo {
                port_name: p.port_name,
                port_type: port_type.to_string(),
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}

fn is_listed(port_name: &str) -> bool {
    if cfg!(target_os = "macos") {
        !port_name.starts_with("/dev/tty.")
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_port_is_port_unavailable() {
        // Arrange
        let opener = SerialPortOpener::new();

        // Act
        let result = opener.open(
            "/dev/slidermix-does-not-exist",
            9600,
            Duration::from_millis(50),
        );

        // Assert
        match result {
            Err(LinkError::PortUnavailable { port, .. }) => {
                assert_eq!(port, "/dev/slidermix-does-not-exist")
            }
            Err(other) => panic!("expected PortUnavailable, got {other}"),
            Ok(_) => panic!("expected PortUnavailable, got an open port"),
        }
    }

    #[test]
    fn test_is_listed_filters_tty_only_on_macos() {
        assert!(is_listed("/dev/cu.usbmodem1101"));
        assert!(is_listed("COM3"));
        assert_eq!(is_listed("/dev/tty.usbmodem1101"), !cfg!(target_os = "macos"));
    }
}
