//! Staging store seam: the external non-volatile buffer that holds the
//! incoming image before it is committed to program memory.
//!
//! The upload session is the only writer; the boot finalizer is the only
//! reader, and it runs strictly after the session has finished. The store
//! keeps a running application checksum over every byte appended since
//! the last reset so the finish command can validate the whole image in
//! constant space.

use log::debug;

use crate::error::{Error, Result};
use crate::wire::xor_checksum;

/// Append-only staging buffer with a running application checksum.
pub trait StagingStore {
    /// Clear the staged image and the running checksum.
    fn reset(&mut self) -> Result<()>;

    /// Append bytes to the staged image and fold them into the checksum.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Compare the running checksum to `expected`.
    ///
    /// The staged image is retained regardless of the outcome; a failed
    /// finalize leaves previously staged bytes readable.
    fn finalize(&mut self, expected: u8) -> Result<bool>;

    /// Number of bytes staged since the last reset.
    fn len(&self) -> u32;

    /// Whether nothing has been staged since the last reset.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read staged bytes starting at `offset` into `buf`, filling it.
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<()>;
}

/// RAM-backed staging store.
///
/// Stands in for the external flash chip on the flight hardware; also the
/// backing store used by every test in this crate.
#[derive(Debug, Default)]
pub struct MemoryStagingStore {
    data: Vec<u8>,
    checksum: u8,
    capacity: Option<usize>,
}

impl MemoryStagingStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects appends beyond `capacity` bytes,
    /// mirroring the finite staging device.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// The staged bytes.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

impl StagingStore for MemoryStagingStore {
    fn reset(&mut self) -> Result<()> {
        self.data.clear();
        self.checksum = 0;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        if let Some(cap) = self.capacity {
            if self.data.len() + data.len() > cap {
                return Err(Error::Staging(format!(
                    "staging capacity exceeded: {} + {} > {cap}",
                    self.data.len(),
                    data.len()
                )));
            }
        }
        self.checksum ^= xor_checksum(data);
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finalize(&mut self, expected: u8) -> Result<bool> {
        let ok = self.checksum == expected;
        if !ok {
            debug!(
                "staging checksum mismatch: expected 0x{expected:02X}, have 0x{:02X}",
                self.checksum
            );
        }
        Ok(ok)
    }

    fn len(&self) -> u32 {
        self.data.len() as u32
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        let slice = self
            .data
            .get(start..end)
            .ok_or_else(|| Error::Staging(format!("read {start}..{end} beyond staged image")))?;
        buf.copy_from_slice(slice);
        Ok(())
    }
}
