//! Byte-channel abstraction for the upload and status links.
//!
//! Protocol components ([`crate::transport`], [`crate::telemetry`],
//! [`crate::host`]) are generic over plain `Read + Write` so they run
//! unchanged against a real serial port, a pseudo-terminal, or the
//! scripted channels in [`crate::sim`]. The [`Channel`] trait adds the
//! port-management operations the host tooling needs on top of raw I/O.

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Serial channel configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate. The flight hardware runs its links at 9600.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            timeout: Duration::from_millis(200),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information reported by an enumerator.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Managed byte channel for host-side tooling.
///
/// On the device the upload and status links are bare UARTs with nothing
/// to manage; host implementations additionally expose timeout control
/// and buffer clearing so deadline-based waits behave.
pub trait Channel: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Discard any pending input/output.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the channel name/path.
    fn name(&self) -> &str;

    /// Close the channel and release resources.
    fn close(&mut self) -> Result<()>;
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativeChannel, NativeEnumerator};
