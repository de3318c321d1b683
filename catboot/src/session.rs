//! Upload session state machine.
//!
//! Interprets the command byte of each validated frame and drives the
//! staging store. The session itself performs no I/O; it reports what
//! happened through [`SessionEvent`] and the caller emits telemetry and
//! console output. That keeps every transition directly testable.
//!
//! Status path: `Ready -> Uploading -> (Uploading | Success | Failure)`,
//! with `Failure -> Uploading` allowed through a fresh start command that
//! discards previously staged bytes.

use log::{debug, warn};

use crate::error::Result;
use crate::staging::StagingStore;
use crate::wire::{Command, UploadStatus};

/// What a handled frame did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Ping handled; link is alive, no state change.
    Pong,
    /// The session status changed; the new status should be reported.
    StatusChanged(UploadStatus),
    /// A chunk was staged; `total` bytes staged so far.
    Progress {
        /// Total bytes staged since the last start command.
        total: u32,
    },
    /// The command opcode was not recognized; no state change.
    Unrecognized(u8),
    /// The frame carried no payload; nothing to do.
    Empty,
}

/// Command-driven upload session over a staging store.
pub struct UploadSession<S: StagingStore> {
    staging: S,
    status: UploadStatus,
    bytes_staged: u32,
}

impl<S: StagingStore> UploadSession<S> {
    /// Create a session in the `Ready` state.
    pub fn new(staging: S) -> Self {
        Self {
            staging,
            status: UploadStatus::Ready,
            bytes_staged: 0,
        }
    }

    /// Current session status.
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Bytes staged since the last start command.
    pub fn bytes_staged(&self) -> u32 {
        self.bytes_staged
    }

    /// Get a reference to the staging store.
    pub fn staging(&self) -> &S {
        &self.staging
    }

    /// Consume the session and return the staging store.
    pub fn into_staging(self) -> S {
        self.staging
    }

    /// Handle one validated frame payload.
    pub fn handle(&mut self, payload: &[u8]) -> Result<SessionEvent> {
        let Some((&op, rest)) = payload.split_first() else {
            debug!("empty frame, ignoring");
            return Ok(SessionEvent::Empty);
        };

        match Command::from(op) {
            Command::Ping => Ok(SessionEvent::Pong),
            Command::Start => self.start(rest),
            Command::Continue => self.append(rest),
            Command::Finish => self.finish(rest),
            Command::Unknown(op) => {
                warn!("unrecognized command 0x{op:02X}");
                Ok(SessionEvent::Unrecognized(op))
            },
        }
    }

    /// Start (or restart) an upload with the first data chunk.
    ///
    /// Valid in any state: a retry after `Failure` and a mid-upload
    /// restart both simply reset the staging store.
    fn start(&mut self, chunk: &[u8]) -> Result<SessionEvent> {
        self.staging.reset()?;
        self.staging.append(chunk)?;
        self.bytes_staged = chunk.len() as u32;
        self.status = UploadStatus::Uploading;
        debug!("upload started, {} bytes in first chunk", chunk.len());
        Ok(SessionEvent::StatusChanged(UploadStatus::Uploading))
    }

    /// Stage a continuation chunk. Tolerated in any state; no
    /// precondition is enforced.
    fn append(&mut self, chunk: &[u8]) -> Result<SessionEvent> {
        self.staging.append(chunk)?;
        self.bytes_staged += chunk.len() as u32;
        Ok(SessionEvent::Progress {
            total: self.bytes_staged,
        })
    }

    /// Stage the final chunk and validate the application checksum.
    ///
    /// The last payload byte is the checksum; everything between the
    /// command byte and the checksum is data. A finish frame too short
    /// to carry a checksum byte fails validation outright.
    fn finish(&mut self, rest: &[u8]) -> Result<SessionEvent> {
        let Some((&expected, data)) = rest.split_last() else {
            warn!("finish frame without checksum byte");
            self.status = UploadStatus::Failure;
            return Ok(SessionEvent::StatusChanged(UploadStatus::Failure));
        };

        self.staging.append(data)?;
        self.bytes_staged += data.len() as u32;

        if self.staging.finalize(expected)? {
            debug!("image validated: {} bytes", self.bytes_staged);
            self.status = UploadStatus::Success;
            Ok(SessionEvent::StatusChanged(UploadStatus::Success))
        } else {
            warn!("image checksum mismatch after {} bytes", self.bytes_staged);
            self.status = UploadStatus::Failure;
            Ok(SessionEvent::StatusChanged(UploadStatus::Failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::MemoryStagingStore;
    use crate::wire::opcode;

    fn session() -> UploadSession<MemoryStagingStore> {
        UploadSession::new(MemoryStagingStore::new())
    }

    #[test]
    fn test_ping_changes_nothing() {
        let mut s = session();
        assert_eq!(s.handle(&[opcode::PING]).unwrap(), SessionEvent::Pong);
        assert_eq!(s.status(), UploadStatus::Ready);
        assert_eq!(s.bytes_staged(), 0);
    }

    #[test]
    fn test_start_continue_finish_success() {
        let mut s = session();

        let ev = s.handle(&[opcode::START, 0x41]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Uploading));

        let ev = s.handle(&[opcode::CONTINUE, 0x42]).unwrap();
        assert_eq!(ev, SessionEvent::Progress { total: 2 });

        // Checksum of "AB" is 0x03.
        let ev = s.handle(&[opcode::FINISH, 0x03]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Success));
        assert_eq!(s.staging().contents(), &[0x41, 0x42]);
    }

    #[test]
    fn test_spec_scenario_single_start_then_finish() {
        // start-upload "AB", then a bare finish carrying checksum 0x03.
        let mut s = session();
        s.handle(&[0x05, 0x41, 0x42]).unwrap();
        let ev = s.handle(&[0x07, 0x03]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Success));
        assert_eq!(s.bytes_staged(), 2);
        assert_eq!(s.staging().contents(), &[0x41, 0x42]);
    }

    #[test]
    fn test_wrong_checksum_fails_then_retry_succeeds() {
        let mut s = session();
        s.handle(&[0x05, 0x41, 0x42]).unwrap();
        let ev = s.handle(&[0x07, 0x00]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Failure));
        // Staged bytes survive a failed finalize.
        assert_eq!(s.staging().contents(), &[0x41, 0x42]);

        // A fresh start discards them and the session recovers.
        let ev = s.handle(&[0x05, 0x10, 0x20]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Uploading));
        let ev = s.handle(&[0x07, 0x30]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Success));
        assert_eq!(s.staging().contents(), &[0x10, 0x20]);
    }

    #[test]
    fn test_double_start_is_idempotent_reset() {
        let mut s = session();
        s.handle(&[0x05, 0x01, 0x02, 0x03]).unwrap();
        s.handle(&[0x05, 0x0A]).unwrap();
        assert_eq!(s.bytes_staged(), 1);
        assert_eq!(s.staging().contents(), &[0x0A]);
    }

    #[test]
    fn test_finish_with_data_chunk() {
        let mut s = session();
        s.handle(&[0x05, 0x41]).unwrap();
        // Finish carries one more data byte 0x42 plus the checksum.
        let ev = s.handle(&[0x07, 0x42, 0x03]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Success));
        assert_eq!(s.staging().contents(), &[0x41, 0x42]);
    }

    #[test]
    fn test_finish_without_checksum_byte_is_failure() {
        let mut s = session();
        s.handle(&[0x05, 0x41]).unwrap();
        let ev = s.handle(&[0x07]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Failure));
    }

    #[test]
    fn test_unrecognized_command_keeps_state() {
        let mut s = session();
        s.handle(&[0x05, 0x41]).unwrap();
        let ev = s.handle(&[0xDE, 0xAD]).unwrap();
        assert_eq!(ev, SessionEvent::Unrecognized(0xDE));
        assert_eq!(s.status(), UploadStatus::Uploading);
        assert_eq!(s.staging().contents(), &[0x41]);
    }

    #[test]
    fn test_empty_payload_is_ignored() {
        let mut s = session();
        assert_eq!(s.handle(&[]).unwrap(), SessionEvent::Empty);
        assert_eq!(s.status(), UploadStatus::Ready);
    }

    #[test]
    fn test_empty_start_then_empty_finish() {
        // A zero-byte image: start with no data, finish with checksum 0.
        let mut s = session();
        s.handle(&[0x05]).unwrap();
        let ev = s.handle(&[0x07, 0x00]).unwrap();
        assert_eq!(ev, SessionEvent::StatusChanged(UploadStatus::Success));
        assert_eq!(s.bytes_staged(), 0);
    }
}
