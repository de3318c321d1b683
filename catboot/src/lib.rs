//! # catboot
//!
//! Field-update bootloader for the CatSat avionics stack, plus the
//! host-side tooling that talks to it.
//!
//! The device side serves a small framed command protocol over a serial
//! uplink: an image is streamed into a staging store, validated with an
//! XOR checksum, committed to program memory page by page and then booted.
//! Progress is reported as fixed-layout telemetry frames on a status
//! downlink and as plain text on a diagnostic console.
//!
//! The crate is split along the links and hardware seams:
//!
//! - [`wire`]: frame layout, command opcodes, status codes, checksums
//! - [`transport`]: resynchronizing frame reader/writer over any channel
//! - [`session`]: the command-driven upload state machine
//! - [`staging`]: the staging store seam and its RAM implementation
//! - [`flash`] / [`hal`]: page-aligned programming over the hardware traits
//! - [`finalize`] / [`boot`]: commit-and-restart sequence and the main loop
//! - [`host`] / [`monitor`]: operator-side uploader and downlink scanner
//! - [`sim`]: in-memory hardware used by tests and integration rigs
//!
//! ## Features
//!
//! - `native` (default): serial port channels via the `serialport` crate
//! - `serde`: serialization support for status and port types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use catboot::channel::SerialConfig;
//! use catboot::host::Uploader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0", 9600);
//!     let channel = catboot::channel::NativeChannel::open(&config)?;
//!
//!     let mut uploader = Uploader::new(channel)
//!         .with_status_timeout(Duration::from_secs(30));
//!     let image = std::fs::read("app.bin")?;
//!     let verdict = uploader.upload(&image, |sent, total| {
//!         println!("{sent}/{total}");
//!     })?;
//!     println!("device reported {verdict}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod boot;
pub mod channel;
pub mod error;
pub mod finalize;
pub mod flash;
pub mod hal;
pub mod host;
pub mod monitor;
pub mod session;
pub mod sim;
pub mod staging;
pub mod telemetry;
pub mod transport;
pub mod wire;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupt_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use channel::{NativeChannel, NativeEnumerator};
pub use {
    boot::Bootloader,
    channel::{Channel, PortInfo, SerialConfig},
    error::{Error, Result},
    finalize::BootFinalizer,
    flash::FlashProgrammer,
    hal::{FlashDevice, MetadataStore, SystemControl},
    host::Uploader,
    monitor::{MonitorEvent, TelemetryScanner},
    session::{SessionEvent, UploadSession},
    staging::{MemoryStagingStore, StagingStore},
    telemetry::{DiagConsole, TelemetryReporter},
    transport::FrameTransport,
    wire::{Command, Frame, UploadStatus},
};
