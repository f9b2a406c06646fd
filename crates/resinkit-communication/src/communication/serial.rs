//! Serial port link implementation
//!
//! Provides the hardware [`SerialLink`] backed by the `serialport` crate,
//! plus port enumeration for the operator console.
//!
//! Reads are done by polling `bytes_to_read` with a short sleep so a
//! deadline can be honored exactly without relying on the driver's own
//! read timeout.

use super::link::{decode_bytes, encode_line, LinkOpener, LinkParams, SerialLink, LINE_TERMINATOR};
use resinkit_core::{ConnectionError, Error, Result};
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Sleep between polls while waiting for input
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/serial0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }
}

/// List serial ports a printer board could be attached to
///
/// Filters ports to:
/// - Raspberry Pi UARTs: /dev/serial*, /dev/ttyAMA*, /dev/ttyS*
/// - USB adapters: /dev/ttyUSB*, /dev/ttyACM*, /dev/cu.usb*
/// - Windows: COM*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .filter(|port| is_printer_port(&port.port_name))
            .map(|port| {
                let info = SerialPortInfo::new(&port.port_name, port_description(port));
                match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb_info) => {
                        match usb_info.manufacturer.as_deref() {
                            Some(mfg) => info.with_manufacturer(mfg),
                            None => info,
                        }
                    }
                    _ => info,
                }
            })
            .collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(Error::other(format!("Failed to enumerate ports: {}", e)))
        }
    }
}

fn is_printer_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    [
        "/dev/serial",
        "/dev/ttyAMA",
        "/dev/ttyS",
        "/dev/ttyUSB",
        "/dev/ttyACM",
        "/dev/cu.usb",
    ]
    .iter()
    .any(|prefix| port_name.starts_with(prefix))
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => format!(
            "USB {} {}",
            usb_info.manufacturer.as_deref().unwrap_or("Device"),
            usb_info.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Map an open failure onto the connection error taxonomy
fn classify_open_error(port: &str, err: serialport::Error) -> ConnectionError {
    let exists = Path::new(port).exists();
    match err.kind() {
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => ConnectionError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::NoDevice if !exists => ConnectionError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::ResourceBusy) => {
            ConnectionError::PortInUse {
                port: port.to_string(),
            }
        }
        _ => ConnectionError::FailedToOpen {
            port: port.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Hardware link backed by the `serialport` crate
pub struct SerialPortLink {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialPortLink {
    /// Open the device and wait out the settle delay
    pub fn open(params: &LinkParams) -> Result<Self> {
        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(READ_POLL_INTERVAL)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| classify_open_error(&params.port, e))?;

        tracing::info!(
            "Opened serial port {} at {} baud",
            params.port,
            params.baud_rate
        );

        // The board resets when the port opens.
        if !params.settle_delay.is_zero() {
            thread::sleep(params.settle_delay);
        }

        Ok(Self {
            port: Some(port),
            name: params.port.clone(),
        })
    }

    /// Device path
    pub fn name(&self) -> &str {
        &self.name
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

impl SerialLink for SerialPortLink {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn reset_buffers(&mut self) -> io::Result<()> {
        self.port_mut()?
            .clear(serialport::ClearBuffer::All)
            .map_err(io::Error::from)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let port = self.port_mut()?;
        port.write_all(&encode_line(line))?;
        port.flush()
    }

    fn read_until_terminator(&mut self, deadline: Instant) -> io::Result<String> {
        let port = self.port_mut()?;
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        while Instant::now() < deadline {
            if port.bytes_to_read().map_err(io::Error::from)? == 0 {
                thread::sleep(READ_POLL_INTERVAL);
                continue;
            }
            match port.read(&mut byte) {
                Ok(1) => {
                    buffer.push(byte[0]);
                    if byte[0] == LINE_TERMINATOR as u8 {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
        }

        Ok(decode_bytes(&buffer))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("Closed serial port {}", self.name);
        }
    }
}

/// Opens [`SerialPortLink`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl LinkOpener for SerialPortOpener {
    fn open(&self, params: &LinkParams) -> Result<Box<dyn SerialLink>> {
        Ok(Box::new(SerialPortLink::open(params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printer_port_patterns() {
        assert!(is_printer_port("/dev/serial0"));
        assert!(is_printer_port("/dev/ttyAMA0"));
        assert!(is_printer_port("/dev/ttyUSB1"));
        assert!(is_printer_port("/dev/ttyACM0"));
        assert!(is_printer_port("/dev/cu.usbmodem1421"));
        assert!(is_printer_port("COM3"));
        assert!(!is_printer_port("COM"));
        assert!(!is_printer_port("COMX"));
        assert!(!is_printer_port("/dev/tty0"));
        assert!(!is_printer_port("/dev/null"));
    }

    #[test]
    fn test_open_missing_port_is_not_found() {
        let params = LinkParams {
            port: "/dev/resinkit-does-not-exist".to_string(),
            settle_delay: Duration::ZERO,
            ..LinkParams::default()
        };
        let err = SerialPortOpener.open(&params).err().unwrap();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::PortNotFound { .. })
                | Error::Connection(ConnectionError::FailedToOpen { .. })
        ));
    }
}
