//! # Serial Communication Module
//!
//! Handles the serial connection to the CoDrone link dongle.
//!
//! This module handles:
//! - Resolving the port (explicit path or the last enumerated port)
//! - Opening the port at 115,200 baud, 8N1, no flow control
//! - Splitting it into independently owned read and write halves

pub mod port_trait;

use crate::config::SerialConfig;
use crate::error::{LinkError, Result};
use port_trait::{TokioSerialPort, TokioSerialReader};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

/// Link dongle baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Pick the port to open
///
/// An explicit path is used as given. An empty path selects the last port the
/// OS enumerates, which is where a freshly plugged dongle usually shows up.
///
/// # Errors
///
/// Returns `SerialPortNotFound` if auto-selection finds no ports
pub fn resolve_port(configured: &str) -> Result<String> {
    if !configured.is_empty() {
        return Ok(configured.to_string());
    }

    let ports = tokio_serial::available_ports()
        .map_err(|e| LinkError::Serial(format!("Failed to enumerate ports: {}", e)))?;

    for port in &ports {
        debug!("Found serial port: {}", port.port_name);
    }

    ports
        .last()
        .map(|port| port.port_name.clone())
        .ok_or_else(|| LinkError::SerialPortNotFound("auto-select".to_string()))
}

/// Open a specific serial port with link settings
fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| LinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(port)
}

/// Open the configured port and split it into read and write halves
///
/// Returns the halves and the path that was opened.
///
/// # Examples
///
/// ```no_run
/// use codrone_link::config::SerialConfig;
/// use codrone_link::serial;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (_reader, _writer, path) = serial::open(&SerialConfig::default())?;
///     println!("Connected to: {}", path);
///     Ok(())
/// }
/// ```
pub fn open(config: &SerialConfig) -> Result<(TokioSerialReader, TokioSerialPort, String)> {
    let path = resolve_port(&config.port)?;
    let stream = open_port(&path, config.baud_rate)?;
    info!("Opened link dongle at {} ({} baud)", path, config.baud_rate);

    let (reader, writer) = tokio::io::split(stream);
    Ok((TokioSerialReader::new(reader), TokioSerialPort::new(writer), path))
}
