//! Boot finalization: commit the validated image to program memory and
//! hand control to it.
//!
//! The sequence is fixed: mask interrupts, stream the staged image into
//! program memory one page window at a time, unmask, persist the image
//! size for the application, quiesce the peripherals, restart. Once it
//! starts there is no abort path; a failure mid-way surfaces as an error
//! to the embedding loop, which on real hardware has nothing left to do
//! but report and retry from a clean upload.

use log::info;

use crate::error::Result;
use crate::flash::FlashProgrammer;
use crate::hal::{FlashDevice, IMAGE_SIZE_KEY, MetadataStore, SystemControl};
use crate::staging::StagingStore;

/// Drives the commit-and-restart sequence.
pub struct BootFinalizer<F: FlashDevice, M: MetadataStore, C: SystemControl> {
    programmer: FlashProgrammer<F>,
    metadata: M,
    system: C,
    base_address: u32,
}

impl<F: FlashDevice, M: MetadataStore, C: SystemControl> BootFinalizer<F, M, C> {
    /// Create a finalizer that programs images at `base_address`.
    pub fn new(device: F, metadata: M, system: C, base_address: u32) -> Self {
        Self {
            programmer: FlashProgrammer::new(device),
            metadata,
            system,
            base_address,
        }
    }

    /// Get a reference to the flash programmer.
    pub fn programmer(&self) -> &FlashProgrammer<F> {
        &self.programmer
    }

    /// Get a reference to the system control.
    pub fn system(&self) -> &C {
        &self.system
    }

    /// Get a reference to the metadata store.
    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Program the staged image and restart into it.
    ///
    /// `staging` must hold a checksum-validated image. On hardware the
    /// final restart does not return; in simulation it records the
    /// request and this function returns `Ok`.
    pub fn finalize<S: StagingStore>(&mut self, staging: &S) -> Result<()> {
        let total = staging.len();
        let page_size = self.programmer.page_size();
        info!("committing {total} byte image at 0x{:04X}", self.base_address);

        self.system.mask_interrupts();

        let mut offset = 0u32;
        let mut window = vec![0u8; page_size];
        while offset < total {
            let chunk = usize::min(page_size, (total - offset) as usize);
            staging.read(offset, &mut window[..chunk])?;
            self.programmer
                .write_page_aligned(self.base_address + offset, &window[..chunk])?;
            offset += chunk as u32;
        }

        self.system.unmask_interrupts();
        self.metadata.write_u32(IMAGE_SIZE_KEY, total)?;
        self.system.quiesce()?;

        info!("restarting into new image");
        self.system.restart()
    }
}
