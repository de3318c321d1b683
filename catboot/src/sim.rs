//! In-memory device simulation.
//!
//! Host-side stand-ins for the hardware capability traits plus a scripted
//! byte channel. The flash model enforces the erase-immediately-before-
//! commit page invariant, so tests catch programmer-sequencing bugs, not
//! just wrong final contents. Used throughout this crate's tests and
//! available to downstream integration rigs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::flash::ERASED_FILL;
use crate::hal::{FlashDevice, MetadataStore, SystemControl};

/// Simulated page-oriented program memory.
pub struct SimFlash {
    mem: Vec<u8>,
    page_size: usize,
    latch: HashMap<u32, Vec<u8>>,
    erased: HashSet<u32>,
    /// Pages erased since construction.
    pub erase_count: usize,
    /// Pages committed since construction.
    pub commit_count: usize,
    /// Completion waits observed.
    pub busy_waits: usize,
    /// Whether fetch/execute has been re-enabled after programming.
    pub read_enabled: bool,
}

impl SimFlash {
    /// Create a device of `pages` pages of `page_size` bytes, all erased.
    ///
    /// # Panics
    ///
    /// Panics unless `page_size` is a power of two of at least 2.
    pub fn new(page_size: usize, pages: usize) -> Self {
        assert!(
            page_size >= 2 && page_size.is_power_of_two(),
            "page size must be a power of two"
        );
        Self {
            mem: vec![ERASED_FILL; page_size * pages],
            page_size,
            latch: HashMap::new(),
            erased: HashSet::new(),
            erase_count: 0,
            commit_count: 0,
            busy_waits: 0,
            read_enabled: false,
        }
    }

    /// Raw contents of the simulated program memory.
    pub fn contents(&self) -> &[u8] {
        &self.mem
    }

    fn check_page_aligned(&self, address: u32) -> Result<()> {
        if address as usize % self.page_size != 0 {
            return Err(Error::Flash(format!(
                "address 0x{address:04X} is not page-aligned"
            )));
        }
        if address as usize >= self.mem.len() {
            return Err(Error::Flash(format!(
                "address 0x{address:04X} beyond device end 0x{:04X}",
                self.mem.len()
            )));
        }
        Ok(())
    }
}

impl FlashDevice for SimFlash {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn erase_page(&mut self, address: u32) -> Result<()> {
        self.check_page_aligned(address)?;
        let start = address as usize;
        self.mem[start..start + self.page_size].fill(ERASED_FILL);
        self.erased.insert(address);
        self.latch.remove(&address);
        self.erase_count += 1;
        self.read_enabled = false;
        Ok(())
    }

    fn load_word(&mut self, address: u32, word: u16) -> Result<()> {
        if address % 2 != 0 {
            return Err(Error::Flash(format!(
                "word address 0x{address:04X} is not 2-aligned"
            )));
        }
        let page = address - (address % self.page_size as u32);
        self.check_page_aligned(page)?;
        if !self.erased.contains(&page) {
            return Err(Error::Flash(format!(
                "load into page 0x{page:04X} that was not erased first"
            )));
        }
        let buf = self
            .latch
            .entry(page)
            .or_insert_with(|| vec![ERASED_FILL; self.page_size]);
        let off = (address - page) as usize;
        buf[off] = (word & 0xFF) as u8;
        buf[off + 1] = (word >> 8) as u8;
        Ok(())
    }

    fn commit_page(&mut self, address: u32) -> Result<()> {
        self.check_page_aligned(address)?;
        if !self.erased.remove(&address) {
            return Err(Error::Flash(format!(
                "commit of page 0x{address:04X} without a preceding erase"
            )));
        }
        let buf = self
            .latch
            .remove(&address)
            .unwrap_or_else(|| vec![ERASED_FILL; self.page_size]);
        let start = address as usize;
        self.mem[start..start + self.page_size].copy_from_slice(&buf);
        self.commit_count += 1;
        Ok(())
    }

    fn busy_wait(&mut self) {
        self.busy_waits += 1;
    }

    fn enable_read(&mut self) -> Result<()> {
        self.read_enabled = true;
        Ok(())
    }
}

/// Simulated interrupt/restart control that records the call sequence.
#[derive(Debug, Default)]
pub struct SimSystem {
    /// Ordered record of control calls ("mask", "unmask", "quiesce",
    /// "restart").
    pub events: Vec<&'static str>,
}

impl SimSystem {
    /// Create a fresh recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a restart was requested.
    pub fn restarted(&self) -> bool {
        self.events.contains(&"restart")
    }
}

impl SystemControl for SimSystem {
    fn mask_interrupts(&mut self) {
        self.events.push("mask");
    }

    fn unmask_interrupts(&mut self) {
        self.events.push("unmask");
    }

    fn quiesce(&mut self) -> Result<()> {
        self.events.push("quiesce");
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.events.push("restart");
        Ok(())
    }
}

/// Simulated durable key/value store.
#[derive(Debug, Default)]
pub struct SimMetadata {
    /// Stored values by key.
    pub values: HashMap<u16, u32>,
}

impl SimMetadata {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for SimMetadata {
    fn write_u32(&mut self, key: u16, value: u32) -> Result<()> {
        self.values.insert(key, value);
        Ok(())
    }
}

/// Scripted byte channel with independent read and write sides.
///
/// Reads pop from a pre-loaded script; once the script is exhausted,
/// reads fail with `UnexpectedEof` so receive loops terminate instead of
/// spinning. Writes accumulate in `tx` for inspection.
pub struct ScriptedLink {
    rx: VecDeque<u8>,
    /// Everything written to the channel.
    pub tx: Vec<u8>,
}

impl ScriptedLink {
    /// Create a link that will yield `script` on reads.
    pub fn new(script: &[u8]) -> Self {
        Self {
            rx: script.iter().copied().collect(),
            tx: Vec::new(),
        }
    }

    /// Create a link with nothing to read (write-only use).
    pub fn sink() -> Self {
        Self::new(&[])
    }

    /// Queue more bytes for reading.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.rx.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "script exhausted",
            ));
        }
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap_or(0);
        }
        Ok(n)
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_flash_requires_erase_before_commit() {
        let mut flash = SimFlash::new(8, 4);
        assert!(flash.commit_page(0).is_err());
        flash.erase_page(0).unwrap();
        flash.load_word(0, 0x4241).unwrap();
        flash.commit_page(0).unwrap();
        assert_eq!(&flash.contents()[..2], &[0x41, 0x42]);
        // The second commit needs a fresh erase.
        assert!(flash.commit_page(0).is_err());
    }

    #[test]
    fn test_sim_flash_unlatched_bytes_stay_erased() {
        let mut flash = SimFlash::new(8, 1);
        flash.erase_page(0).unwrap();
        flash.load_word(2, 0x0201).unwrap();
        flash.commit_page(0).unwrap();
        assert_eq!(flash.contents(), &[0xFF, 0xFF, 0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_sim_flash_rejects_misaligned_ops() {
        let mut flash = SimFlash::new(8, 2);
        assert!(flash.erase_page(3).is_err());
        flash.erase_page(8).unwrap();
        assert!(flash.load_word(9, 0).is_err());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_sim_flash_rejects_non_power_of_two_page() {
        let _ = SimFlash::new(6, 4);
    }

    #[test]
    fn test_scripted_link_eof_after_script() {
        let mut link = ScriptedLink::new(&[1, 2]);
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert!(link.read(&mut buf).is_err());

        link.feed(&[9]);
        assert_eq!(link.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 9);
    }
}
