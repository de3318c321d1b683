//! Status telemetry and the diagnostic text console.
//!
//! Each reporter owns its channel outright; nothing else in the
//! bootloader writes to the status or console links.

use std::io::Write;

use log::debug;

use crate::error::Result;
use crate::wire::{UploadStatus, build_telemetry};

/// Emits fixed-layout status frames on the status channel.
pub struct TelemetryReporter<C: Write> {
    channel: C,
}

impl<C: Write> TelemetryReporter<C> {
    /// Create a reporter owning `channel`.
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Send one telemetry frame for `status`.
    pub fn report(&mut self, status: UploadStatus) -> Result<()> {
        debug!("telemetry: {status}");
        let frame = build_telemetry(status);
        self.channel.write_all(&frame)?;
        self.channel.flush()?;
        Ok(())
    }

    /// Get a reference to the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Consume the reporter and return the channel.
    pub fn into_channel(self) -> C {
        self.channel
    }
}

/// Human-readable diagnostic output on the console link.
///
/// The observer on the other end is a terminal; output is plain text
/// with CRLF line endings.
pub struct DiagConsole<C: Write> {
    channel: C,
}

impl<C: Write> DiagConsole<C> {
    /// Create a console owning `channel`.
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Write one text line.
    pub fn line(&mut self, text: &str) -> Result<()> {
        self.channel.write_all(text.as_bytes())?;
        self.channel.write_all(b"\r\n")?;
        self.channel.flush()?;
        Ok(())
    }

    /// Write a single progress dot, no line ending.
    pub fn dot(&mut self) -> Result<()> {
        self.channel.write_all(b".")?;
        self.channel.flush()?;
        Ok(())
    }

    /// Get a reference to the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Consume the console and return the channel.
    pub fn into_channel(self) -> C {
        self.channel
    }
}
