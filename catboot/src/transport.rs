//! Frame transport over a byte-oriented serial channel.
//!
//! The receive side implements the resynchronizing reader of the upload
//! link: hunt for the start marker one byte at a time, read the length
//! and payload, and deliver the frame only if the trailing XOR checksum
//! validates. Corrupt frames are discarded whole and the marker hunt
//! restarts, so the transport never hands a partial or damaged payload
//! to the session.

use std::io::{Read, Write};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::is_interrupt_requested;
use crate::wire::{Frame, MAX_PAYLOAD, START_MARKER, build_frame, xor_checksum};

/// Frame reader/writer owning one byte channel.
pub struct FrameTransport<C: Read + Write> {
    channel: C,
    max_payload: usize,
}

impl<C: Read + Write> FrameTransport<C> {
    /// Create a transport over `channel`.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            max_payload: MAX_PAYLOAD,
        }
    }

    /// Cap accepted payload lengths below the wire maximum.
    ///
    /// Length fields above the cap are treated as line corruption: the
    /// frame is discarded and the marker hunt restarts.
    #[must_use]
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.min(MAX_PAYLOAD);
        self
    }

    /// Get a reference to the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Get a mutable reference to the underlying channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consume the transport and return the underlying channel.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Read one byte, absorbing timeouts.
    ///
    /// Timeouts are retried forever (the link is lock-step, a silent line
    /// just means the peer has nothing to say); real channel failures and
    /// end-of-stream propagate, and an interrupt request from the
    /// embedding application aborts the wait.
    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        loop {
            if is_interrupt_requested() {
                return Err(Error::Interrupted);
            }
            match self.channel.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                Ok(_) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "channel closed",
                    )));
                },
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Receive the next checksum-valid frame, blocking until one arrives.
    ///
    /// Structural damage and checksum mismatches are absorbed here: the
    /// broken frame is dropped in full and reception resynchronizes on
    /// the next start marker. Only channel-level failures surface.
    pub fn receive_frame(&mut self) -> Result<Frame> {
        loop {
            // Hunt for the marker; every non-marker byte is line noise or
            // the tail of a frame we already gave up on.
            loop {
                let byte = self.read_byte()?;
                if byte == START_MARKER {
                    break;
                }
                trace!("discarding 0x{byte:02X} while hunting for marker");
            }

            let length = self.read_byte()? as usize;
            if length > self.max_payload {
                debug!("discarding frame with length {length} > cap {}", self.max_payload);
                continue;
            }

            let mut payload = vec![0u8; length];
            for slot in payload.iter_mut() {
                *slot = self.read_byte()?;
            }
            let received = self.read_byte()?;

            let computed = xor_checksum(&payload);
            if received == computed {
                trace!("frame received: {length} payload bytes");
                return Ok(Frame::new(payload));
            }
            debug!(
                "frame checksum mismatch (got 0x{received:02X}, want 0x{computed:02X}), resyncing"
            );
        }
    }

    /// Send one frame built around `payload`.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        let wire = build_frame(payload);
        self.channel.write_all(&wire)?;
        self.channel.flush()?;
        Ok(())
    }
}
