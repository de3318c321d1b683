//! Hardware capability traits.
//!
//! Each peripheral the bootloader touches is wrapped in a small trait and
//! injected at construction: the flash programmer owns the self-programming
//! primitive, the finalizer owns system control and the metadata store.
//! Nothing reaches for ambient global hardware state, and every primitive
//! can be replaced by the in-memory versions in [`crate::sim`].

use crate::error::Result;

/// Metadata key under which the finalizer persists the image size.
pub const IMAGE_SIZE_KEY: u16 = 0x0000;

/// Self-programming primitive of the program-memory hardware.
///
/// Mirrors the page-oriented erase/fill/commit model of the target MCU
/// class: a page must be erased before any word in it can be rewritten,
/// words are assembled two bytes at a time into a hardware page latch, and
/// erase/commit are asynchronous with a blocking completion wait.
pub trait FlashDevice {
    /// Fixed hardware page size in bytes. Always a power of two, as on
    /// every device of this class; address alignment relies on it.
    fn page_size(&self) -> usize;

    /// Start erasing the page containing `address` (page-aligned).
    fn erase_page(&mut self, address: u32) -> Result<()>;

    /// Load one 16-bit word into the page latch at `address` (2-aligned).
    fn load_word(&mut self, address: u32, word: u16) -> Result<()>;

    /// Commit the latched words to the page at `address` (page-aligned).
    fn commit_page(&mut self, address: u32) -> Result<()>;

    /// Block until the pending erase/commit completes.
    ///
    /// The hardware gives no failure indication; tests inject instant
    /// completion instead of real timing.
    fn busy_wait(&mut self);

    /// Re-enable fetch/execute from the programmed region.
    ///
    /// The region is unreadable while programming is in progress.
    fn enable_read(&mut self) -> Result<()>;
}

/// Interrupt masking, peripheral quiesce and restart.
pub trait SystemControl {
    /// Mask all interrupt sources. Self-reprogramming must run with no
    /// concurrent code execution.
    fn mask_interrupts(&mut self);

    /// Unmask interrupt sources.
    fn unmask_interrupts(&mut self);

    /// Release all peripheral configuration so the freshly written
    /// application starts from a clean hardware state.
    fn quiesce(&mut self) -> Result<()>;

    /// Transfer control to the processor entry point.
    ///
    /// On hardware this never returns; simulation implementations record
    /// the request and return so the sequence stays testable.
    fn restart(&mut self) -> Result<()>;
}

/// Durable key/value store read by the application after restart.
pub trait MetadataStore {
    /// Persist a 32-bit value under `key`.
    fn write_u32(&mut self, key: u16, value: u32) -> Result<()>;
}
