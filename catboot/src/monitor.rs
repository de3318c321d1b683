//! Downlink stream scanner.
//!
//! The status and console links may be multiplexed onto one observed
//! byte stream on the bench. The scanner splits that stream back into
//! status frames and free-form console text, holding partial frames
//! across pushes so callers can feed it whatever read sizes the serial
//! layer produces.

use crate::wire::{START_MARKER, TELEMETRY_LEN, TELEMETRY_TAG, UploadStatus, parse_telemetry};

/// One recognized piece of the downlink stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Console text, lossily decoded.
    Text(String),
    /// A validated status frame.
    Status(UploadStatus),
}

/// Incremental splitter of the downlink byte stream.
#[derive(Debug, Default)]
pub struct TelemetryScanner {
    buf: Vec<u8>,
}

impl TelemetryScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and collect the events they complete.
    ///
    /// A marker byte followed by the telemetry tag is held back until a
    /// full frame's worth of bytes has arrived; everything that fails
    /// frame validation is passed through as text.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<MonitorEvent> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut text = Vec::new();
        let mut i = 0;
        while i < self.buf.len() {
            let rest = &self.buf[i..];
            if rest[0] == START_MARKER {
                if rest.len() >= 2 && rest[1] != TELEMETRY_TAG {
                    text.push(rest[0]);
                    i += 1;
                    continue;
                }
                if rest.len() < TELEMETRY_LEN {
                    // Possible partial frame; wait for more bytes.
                    break;
                }
                if let Some(status) = parse_telemetry(&rest[..TELEMETRY_LEN]) {
                    Self::flush_text(&mut events, &mut text);
                    events.push(MonitorEvent::Status(status));
                    i += TELEMETRY_LEN;
                } else {
                    text.push(rest[0]);
                    i += 1;
                }
            } else {
                text.push(rest[0]);
                i += 1;
            }
        }
        self.buf.drain(..i);

        Self::flush_text(&mut events, &mut text);
        events
    }

    /// Bytes held back as a potential partial frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn flush_text(events: &mut Vec<MonitorEvent>, text: &mut Vec<u8>) {
        if !text.is_empty() {
            events.push(MonitorEvent::Text(
                String::from_utf8_lossy(&std::mem::take(text)).into_owned(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::build_telemetry;

    #[test]
    fn test_text_and_status_interleaved() {
        let mut stream = b"catboot ready\r\n".to_vec();
        stream.extend_from_slice(&build_telemetry(UploadStatus::Ready));
        stream.extend_from_slice(b"...");

        let mut scanner = TelemetryScanner::new();
        let events = scanner.push(&stream);
        assert_eq!(
            events,
            vec![
                MonitorEvent::Text("catboot ready\r\n".into()),
                MonitorEvent::Status(UploadStatus::Ready),
                MonitorEvent::Text("...".into()),
            ],
        );
        assert_eq!(scanner.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let frame = build_telemetry(UploadStatus::Success);
        let mut scanner = TelemetryScanner::new();

        assert!(scanner.push(&frame[..20]).is_empty());
        assert_eq!(scanner.pending(), 20);

        let events = scanner.push(&frame[20..]);
        assert_eq!(events, vec![MonitorEvent::Status(UploadStatus::Success)]);
        assert_eq!(scanner.pending(), 0);
    }

    #[test]
    fn test_marker_without_tag_is_text() {
        let mut scanner = TelemetryScanner::new();
        let events = scanner.push(&[0xFF, 0x00, b'x']);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], MonitorEvent::Text(_)));
    }

    #[test]
    fn test_invalid_frame_body_passes_through_as_text() {
        let mut frame = build_telemetry(UploadStatus::Ready);
        frame[56] ^= 0xFF; // break the checksum byte
        let mut scanner = TelemetryScanner::new();
        let events = scanner.push(&frame);
        // Nothing validates, so every byte degrades to text.
        assert!(events.iter().all(|e| matches!(e, MonitorEvent::Text(_))));
    }

    #[test]
    fn test_byte_at_a_time_feed() {
        let mut stream = b"ok".to_vec();
        stream.extend_from_slice(&build_telemetry(UploadStatus::Uploading));

        let mut scanner = TelemetryScanner::new();
        let mut events = Vec::new();
        for &b in &stream {
            events.extend(scanner.push(&[b]));
        }
        assert!(events.contains(&MonitorEvent::Status(UploadStatus::Uploading)));
    }
}
