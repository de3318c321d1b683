//! Operator-side upload driver.
//!
//! Speaks the command framing from the host end of the link: chunk the
//! image into start/continue/finish frames, then watch the downlink for
//! the device's verdict. The command uplink and the status downlink are
//! carried by the one channel the uploader owns; on the bench both lines
//! run through the same adapter.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::is_interrupt_requested;
use crate::monitor::{MonitorEvent, TelemetryScanner};
use crate::transport::FrameTransport;
use crate::wire::{MAX_PAYLOAD, UploadStatus, opcode, xor_checksum};

/// Default data bytes carried per frame.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Default wait for the device's verdict after the finish frame.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Host-side firmware uploader over one serial channel.
pub struct Uploader<C: Read + Write> {
    transport: FrameTransport<C>,
    chunk_size: usize,
    status_timeout: Duration,
}

impl<C: Read + Write> Uploader<C> {
    /// Create an uploader with default chunking and timeout.
    pub fn new(channel: C) -> Self {
        Self {
            transport: FrameTransport::new(channel),
            chunk_size: DEFAULT_CHUNK_SIZE,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    /// Set the data bytes carried per frame.
    ///
    /// Clamped to the wire limit minus the command byte.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PAYLOAD - 1);
        self
    }

    /// Set how long to wait for the device's verdict.
    #[must_use]
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Consume the uploader and return the channel.
    pub fn into_channel(self) -> C {
        self.transport.into_channel()
    }

    /// Ping the device and return the status it reports.
    pub fn ping(&mut self) -> Result<UploadStatus> {
        self.transport.send_frame(&[opcode::PING])?;
        self.await_status(|_| true)
    }

    /// Upload `image`, returning the device's final verdict.
    ///
    /// `progress` is called with `(bytes_sent, total_bytes)` after every
    /// frame. Returns `Ok(Success)` or `Ok(Failure)` for a verdict the
    /// device delivered; an absent verdict is a timeout error.
    pub fn upload(
        &mut self,
        image: &[u8],
        mut progress: impl FnMut(u64, u64),
    ) -> Result<UploadStatus> {
        let total = image.len() as u64;
        let checksum = xor_checksum(image);
        info!("uploading {total} bytes, checksum 0x{checksum:02X}");

        let mut chunks = image.chunks(self.chunk_size);
        let first = chunks.next().unwrap_or(&[]);

        let mut frame = Vec::with_capacity(self.chunk_size + 2);
        frame.push(opcode::START);
        frame.extend_from_slice(first);
        self.transport.send_frame(&frame)?;
        let mut sent = first.len() as u64;
        progress(sent, total);

        for chunk in chunks {
            if is_interrupt_requested() {
                return Err(Error::Interrupted);
            }
            frame.clear();
            frame.push(opcode::CONTINUE);
            frame.extend_from_slice(chunk);
            self.transport.send_frame(&frame)?;
            sent += chunk.len() as u64;
            progress(sent, total);
        }

        self.transport.send_frame(&[opcode::FINISH, checksum])?;
        debug!("finish frame sent, awaiting verdict");

        self.await_status(|s| matches!(s, UploadStatus::Success | UploadStatus::Failure))
    }

    /// Watch the downlink until a status matching `accept` arrives.
    fn await_status(&mut self, accept: impl Fn(UploadStatus) -> bool) -> Result<UploadStatus> {
        let deadline = Instant::now() + self.status_timeout;
        let mut scanner = TelemetryScanner::new();
        let mut buf = [0u8; 64];

        while Instant::now() < deadline {
            if is_interrupt_requested() {
                return Err(Error::Interrupted);
            }
            let n = match self.transport.channel_mut().read(&mut buf) {
                Ok(n) => n,
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::Interrupted =>
                {
                    continue;
                },
                Err(e) => return Err(Error::Io(e)),
            };
            if n == 0 {
                continue;
            }
            for event in scanner.push(&buf[..n]) {
                match event {
                    MonitorEvent::Status(status) if accept(status) => {
                        debug!("device reported {status}");
                        return Ok(status);
                    },
                    MonitorEvent::Status(status) => {
                        debug!("intermediate status {status}");
                    },
                    MonitorEvent::Text(text) => {
                        debug!("device console: {}", text.trim_end());
                    },
                }
            }
        }
        Err(Error::Timeout("no status frame from device".into()))
    }
}
