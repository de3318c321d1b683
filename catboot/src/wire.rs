//! Upload-link wire format: frames, command opcodes and telemetry.
//!
//! ## Data frame
//!
//! Every unit on the upload channel is a length-delimited frame protected
//! by a single XOR checksum byte:
//!
//! ```text
//! +--------+--------+----------------+----------+
//! | MARKER | LEN L  |  PAYLOAD (L)   | CHECKSUM |
//! +--------+--------+----------------+----------+
//! | 0xFF   | 1 byte |   L bytes      | XOR(P)   |
//! +--------+--------+----------------+----------+
//! ```
//!
//! Payload byte 0 is the command opcode; the rest is command data.
//!
//! ## Telemetry frame
//!
//! Upload status is reported as a fixed 57-byte frame on the status
//! channel: marker, frame-type tag, 53 reserved zero bytes, the status
//! code, and a checksum byte. Because the reserved bytes are zero the
//! checksum always equals the status code.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Start-of-frame marker byte on both channels.
pub const START_MARKER: u8 = 0xFF;

/// Largest payload a frame can carry (the length field is one byte).
pub const MAX_PAYLOAD: usize = 255;

/// Command opcodes (payload byte 0).
pub mod opcode {
    /// Link-liveness ping.
    pub const PING: u8 = 0xAB;
    /// Start a new upload; remaining payload is the first data chunk.
    pub const START: u8 = 0x05;
    /// Continue an upload; remaining payload is the next data chunk.
    pub const CONTINUE: u8 = 0x06;
    /// Finish an upload; last payload byte is the application checksum.
    pub const FINISH: u8 = 0x07;
}

/// Total length of a telemetry frame.
pub const TELEMETRY_LEN: usize = 57;

/// Frame-type tag byte of a telemetry frame (byte 1).
pub const TELEMETRY_TAG: u8 = 0x37;

/// Offset of the status code within a telemetry frame.
pub const TELEMETRY_STATUS_OFFSET: usize = 55;

/// XOR checksum over a byte slice. The identity value (empty input) is 0.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Upload-session command, decoded from payload byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Command {
    /// Link-liveness check; no session state change.
    Ping,
    /// Reset the staging store and stage the first chunk.
    Start,
    /// Stage the next chunk.
    Continue,
    /// Stage the final chunk and validate the application checksum.
    Finish,
    /// Any opcode the session does not recognize.
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(op: u8) -> Self {
        match op {
            opcode::PING => Self::Ping,
            opcode::START => Self::Start,
            opcode::CONTINUE => Self::Continue,
            opcode::FINISH => Self::Finish,
            other => Self::Unknown(other),
        }
    }
}

/// Upload session status, as carried in telemetry frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum UploadStatus {
    /// No session activity yet.
    #[default]
    None = 0,
    /// Bootloader is up and waiting for commands.
    Ready = 1,
    /// An upload is in progress.
    Uploading = 2,
    /// The staged image validated; finalization begins.
    Success = 3,
    /// The staged image failed validation; a fresh start is awaited.
    Failure = 4,
}

impl UploadStatus {
    /// Wire code of this status.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire status code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Ready),
            2 => Some(Self::Uploading),
            3 => Some(Self::Success),
            4 => Some(Self::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Ready => "ready",
            Self::Uploading => "uploading",
            Self::Success => "success",
            Self::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// One validated frame as delivered by the transport.
///
/// Holds only the logical payload; marker, length and checksum bytes are
/// consumed during reception and never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
}

impl Frame {
    /// Wrap an already-validated payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// The logical payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the frame carries no payload at all.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The command opcode, if the frame has a payload.
    pub fn command(&self) -> Option<Command> {
        self.payload.first().map(|&op| Command::from(op))
    }
}

/// Build a complete on-wire frame around `payload`.
///
/// # Panics
///
/// Panics if `payload` exceeds [`MAX_PAYLOAD`]; callers chunk their data
/// below that bound.
#[allow(clippy::cast_possible_truncation)] // length checked against u8 range
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD,
        "frame payload exceeds {MAX_PAYLOAD} bytes"
    );

    let mut buf = Vec::with_capacity(payload.len() + 3);
    buf.push(START_MARKER);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.push(xor_checksum(payload));
    buf
}

/// Build a 57-byte telemetry frame for `status`.
pub fn build_telemetry(status: UploadStatus) -> [u8; TELEMETRY_LEN] {
    let mut frame = [0u8; TELEMETRY_LEN];
    frame[0] = START_MARKER;
    frame[1] = TELEMETRY_TAG;
    frame[TELEMETRY_STATUS_OFFSET] = status.code();
    // Reserved bytes are zero, so the checksum reduces to the status code.
    frame[TELEMETRY_LEN - 1] = status.code();
    frame
}

/// Parse a telemetry frame starting at `data[0]`.
///
/// Returns `None` if the slice is too short, the marker or tag byte is
/// wrong, the checksum does not cover the body, or the status code is
/// unknown.
pub fn parse_telemetry(data: &[u8]) -> Option<UploadStatus> {
    if data.len() < TELEMETRY_LEN {
        return None;
    }
    if data[0] != START_MARKER || data[1] != TELEMETRY_TAG {
        return None;
    }

    // The reserved bytes are defined as zero, so the checksum reduces to
    // the status code itself.
    if data[2..TELEMETRY_STATUS_OFFSET].iter().any(|&b| b != 0) {
        return None;
    }
    if data[TELEMETRY_LEN - 1] != data[TELEMETRY_STATUS_OFFSET] {
        return None;
    }

    UploadStatus::from_code(data[TELEMETRY_STATUS_OFFSET])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor_checksum_identity_on_empty() {
        assert_eq!(xor_checksum(&[]), 0);
    }

    #[test]
    fn test_xor_checksum_known_value() {
        // Spec scenario: XOR(0x41, 0x42) = 0x03.
        assert_eq!(xor_checksum(&[0x41, 0x42]), 0x03);
    }

    #[test]
    fn test_build_frame_layout() {
        let frame = build_frame(&[opcode::START, 0x41, 0x42]);
        assert_eq!(frame[0], START_MARKER);
        assert_eq!(frame[1], 3);
        assert_eq!(&frame[2..5], &[opcode::START, 0x41, 0x42]);
        assert_eq!(frame[5], 0x05 ^ 0x41 ^ 0x42);
    }

    #[test]
    fn test_build_frame_zero_length() {
        let frame = build_frame(&[]);
        assert_eq!(frame, vec![START_MARKER, 0, 0]);
    }

    #[test]
    fn test_command_decoding() {
        assert_eq!(Command::from(0xAB), Command::Ping);
        assert_eq!(Command::from(0x05), Command::Start);
        assert_eq!(Command::from(0x06), Command::Continue);
        assert_eq!(Command::from(0x07), Command::Finish);
        assert_eq!(Command::from(0xDE), Command::Unknown(0xDE));
    }

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            UploadStatus::None,
            UploadStatus::Ready,
            UploadStatus::Uploading,
            UploadStatus::Success,
            UploadStatus::Failure,
        ] {
            assert_eq!(UploadStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(UploadStatus::from_code(5), None);
    }

    #[test]
    fn test_telemetry_layout() {
        let frame = build_telemetry(UploadStatus::Uploading);
        assert_eq!(frame.len(), TELEMETRY_LEN);
        assert_eq!(frame[0], START_MARKER);
        assert_eq!(frame[1], TELEMETRY_TAG);
        assert!(frame[2..TELEMETRY_STATUS_OFFSET].iter().all(|&b| b == 0));
        assert_eq!(frame[TELEMETRY_STATUS_OFFSET], 2);
        assert_eq!(frame[TELEMETRY_LEN - 1], 2);
    }

    #[test]
    fn test_telemetry_round_trip() {
        let frame = build_telemetry(UploadStatus::Success);
        assert_eq!(parse_telemetry(&frame), Some(UploadStatus::Success));
    }

    #[test]
    fn test_telemetry_rejects_corruption() {
        let mut frame = build_telemetry(UploadStatus::Success);
        frame[TELEMETRY_LEN - 1] = 0x00;
        assert_eq!(parse_telemetry(&frame), None);

        let mut frame = build_telemetry(UploadStatus::Ready);
        frame[1] = 0x00;
        assert_eq!(parse_telemetry(&frame), None);

        assert_eq!(parse_telemetry(&[START_MARKER; 10]), None);
    }
}
