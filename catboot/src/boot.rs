//! The bootloader main loop.
//!
//! Composes the frame transport, upload session, telemetry reporter,
//! diagnostic console and boot finalizer into the command-serve loop the
//! device runs after reset: announce readiness, serve upload commands
//! until a validated image is staged, then commit it and restart.

use std::io::{Read, Write};

use log::info;

use crate::error::Result;
use crate::finalize::BootFinalizer;
use crate::hal::{FlashDevice, MetadataStore, SystemControl};
use crate::session::{SessionEvent, UploadSession};
use crate::staging::StagingStore;
use crate::telemetry::{DiagConsole, TelemetryReporter};
use crate::transport::FrameTransport;
use crate::wire::UploadStatus;

/// Full device-side bootloader over three links and the hardware seams.
pub struct Bootloader<L, T, D, S, F, M, C>
where
    L: Read + Write,
    T: Write,
    D: Write,
    S: StagingStore,
    F: FlashDevice,
    M: MetadataStore,
    C: SystemControl,
{
    transport: FrameTransport<L>,
    telemetry: TelemetryReporter<T>,
    console: DiagConsole<D>,
    session: UploadSession<S>,
    finalizer: BootFinalizer<F, M, C>,
}

impl<L, T, D, S, F, M, C> Bootloader<L, T, D, S, F, M, C>
where
    L: Read + Write,
    T: Write,
    D: Write,
    S: StagingStore,
    F: FlashDevice,
    M: MetadataStore,
    C: SystemControl,
{
    /// Assemble a bootloader from its pre-built components.
    pub fn new(
        transport: FrameTransport<L>,
        telemetry: TelemetryReporter<T>,
        console: DiagConsole<D>,
        session: UploadSession<S>,
        finalizer: BootFinalizer<F, M, C>,
    ) -> Self {
        Self {
            transport,
            telemetry,
            console,
            session,
            finalizer,
        }
    }

    /// Get a reference to the finalizer (flash, metadata and system state).
    pub fn finalizer(&self) -> &BootFinalizer<F, M, C> {
        &self.finalizer
    }

    /// Get a reference to the telemetry reporter.
    pub fn telemetry(&self) -> &TelemetryReporter<T> {
        &self.telemetry
    }

    /// Get a reference to the upload session.
    pub fn session(&self) -> &UploadSession<S> {
        &self.session
    }

    /// Serve upload commands until an image validates, then commit it and
    /// restart into it.
    ///
    /// Exits `Ok` only through a successful finalize. Checksum failures
    /// keep the loop serving (the operator retries with a fresh start
    /// command); only channel-level failures and interrupt requests
    /// surface as errors.
    pub fn run(&mut self) -> Result<()> {
        self.console.line("catboot ready")?;
        self.telemetry.report(UploadStatus::Ready)?;

        loop {
            let frame = self.transport.receive_frame()?;
            match self.session.handle(frame.payload())? {
                SessionEvent::Pong => {
                    self.console.line("pong")?;
                    // The host-side ping() reads its answer from the
                    // status channel, so a ping also gets a status frame.
                    self.telemetry.report(self.session.status())?;
                },
                SessionEvent::StatusChanged(status) => {
                    self.telemetry.report(status)?;
                    match status {
                        UploadStatus::Success => break,
                        UploadStatus::Failure => self.console.line("upload failed")?,
                        _ => {},
                    }
                },
                SessionEvent::Progress { .. } => {
                    self.console.dot()?;
                },
                SessionEvent::Unrecognized(op) => {
                    self.console.line(&format!("? 0x{op:02X}"))?;
                },
                SessionEvent::Empty => {},
            }
        }

        info!("image validated, committing");
        self.console.line("upload complete, flashing")?;
        self.finalizer.finalize(self.session.staging())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ScriptedLink, SimFlash, SimMetadata, SimSystem};
    use crate::staging::MemoryStagingStore;
    use crate::wire::{build_frame, parse_telemetry};

    const PAGE: usize = 16;

    fn bootloader(
        script: &[u8],
    ) -> Bootloader<
        ScriptedLink,
        ScriptedLink,
        ScriptedLink,
        MemoryStagingStore,
        SimFlash,
        SimMetadata,
        SimSystem,
    > {
        Bootloader::new(
            FrameTransport::new(ScriptedLink::new(script)),
            TelemetryReporter::new(ScriptedLink::sink()),
            DiagConsole::new(ScriptedLink::sink()),
            UploadSession::new(MemoryStagingStore::new()),
            BootFinalizer::new(SimFlash::new(PAGE, 4), SimMetadata::new(), SimSystem::new(), 0),
        )
    }

    fn statuses(raw: &[u8]) -> Vec<UploadStatus> {
        raw.chunks(57).filter_map(parse_telemetry).collect()
    }

    #[test]
    fn test_full_upload_commits_and_restarts() {
        let mut script = build_frame(&[0x05, 0x41]);
        script.extend_from_slice(&build_frame(&[0x06, 0x42]));
        script.extend_from_slice(&build_frame(&[0x07, 0x03]));

        let mut boot = bootloader(&script);
        boot.run().unwrap();

        let flash = boot.finalizer().programmer().device();
        assert_eq!(&flash.contents()[..2], &[0x41, 0x42]);
        assert!(boot.finalizer().system().restarted());
        assert_eq!(boot.finalizer().metadata().values.get(&0), Some(&2));

        assert_eq!(
            statuses(&boot.telemetry().channel().tx),
            vec![UploadStatus::Ready, UploadStatus::Uploading, UploadStatus::Success],
        );
    }

    #[test]
    fn test_checksum_failure_does_not_finalize() {
        let mut script = build_frame(&[0x05, 0x41, 0x42]);
        script.extend_from_slice(&build_frame(&[0x07, 0x00])); // wrong checksum

        let mut boot = bootloader(&script);
        // The loop keeps serving after Failure; the exhausted script ends
        // the test by surfacing a channel error.
        assert!(boot.run().is_err());

        let flash = boot.finalizer().programmer().device();
        assert_eq!(flash.erase_count, 0);
        assert!(!boot.finalizer().system().restarted());
        assert_eq!(
            statuses(&boot.telemetry().channel().tx),
            vec![UploadStatus::Ready, UploadStatus::Uploading, UploadStatus::Failure],
        );
    }

    #[test]
    fn test_retry_after_failure_succeeds() {
        let mut script = build_frame(&[0x05, 0x41]);
        script.extend_from_slice(&build_frame(&[0x07, 0xEE])); // fails
        script.extend_from_slice(&build_frame(&[0x05, 0x10, 0x20]));
        script.extend_from_slice(&build_frame(&[0x07, 0x30]));

        let mut boot = bootloader(&script);
        boot.run().unwrap();

        let flash = boot.finalizer().programmer().device();
        assert_eq!(&flash.contents()[..2], &[0x10, 0x20]);
        assert!(boot.finalizer().system().restarted());
    }

    #[test]
    fn test_ping_answers_with_current_status() {
        let mut script = build_frame(&[0xAB]);
        script.extend_from_slice(&build_frame(&[0x05, 0x41, 0x42]));
        script.extend_from_slice(&build_frame(&[0xAB]));
        script.extend_from_slice(&build_frame(&[0x07, 0x03]));

        let mut boot = bootloader(&script);
        boot.run().unwrap();

        assert_eq!(
            statuses(&boot.telemetry().channel().tx),
            vec![
                UploadStatus::Ready,
                UploadStatus::Ready,     // ping before the upload
                UploadStatus::Uploading,
                UploadStatus::Uploading, // ping mid-upload
                UploadStatus::Success,
            ],
        );

        // Each ping also acknowledges on the diagnostic console.
        let console = String::from_utf8_lossy(&boot.console.channel().tx).into_owned();
        assert_eq!(console.matches("pong").count(), 2);
    }

    #[test]
    fn test_unknown_command_marks_console_and_keeps_serving() {
        let mut script = build_frame(&[0xDE, 0xAD]);
        script.extend_from_slice(&build_frame(&[0x05, 0x41, 0x42]));
        script.extend_from_slice(&build_frame(&[0x07, 0x03]));

        let mut boot = bootloader(&script);
        boot.run().unwrap();

        let console = String::from_utf8_lossy(&boot.console.channel().tx).into_owned();
        assert!(console.contains("? 0xDE"));
        assert!(boot.finalizer().system().restarted());
    }

    #[test]
    fn test_line_noise_between_frames_is_tolerated() {
        let mut script = vec![0x13, 0x37];
        script.extend_from_slice(&build_frame(&[0x05, 0x41, 0x42]));
        script.extend_from_slice(&[0x00, 0xFE]);
        script.extend_from_slice(&build_frame(&[0x07, 0x03]));

        let mut boot = bootloader(&script);
        boot.run().unwrap();
        assert!(boot.finalizer().system().restarted());
    }
}
