//! Firmware upload command implementation.

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::time::Duration;

use catboot::channel::{NativeChannel, SerialConfig};
use catboot::host::Uploader;
use catboot::wire::UploadStatus;

use crate::{Cli, get_port};

/// Upload a raw binary image and wait for the device's verdict.
pub(crate) fn cmd_upload(cli: &Cli, image: &Path, chunk_size: usize, timeout: u64) -> Result<()> {
    let data = fs::read(image)
        .with_context(|| format!("failed to read image {}", image.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} uploading {} ({} bytes)",
            style("^").cyan(),
            image.display(),
            data.len()
        );
    }

    let port = get_port(cli)?;
    if !cli.quiet {
        eprintln!(
            "{} using port {} at {} baud",
            style("~").cyan(),
            style(&port).cyan(),
            cli.baud
        );
    }

    let config = SerialConfig::new(&port, cli.baud);
    let channel = NativeChannel::open(&config)
        .with_context(|| format!("failed to open {port}"))?;
    let mut uploader = Uploader::new(channel)
        .with_chunk_size(chunk_size)
        .with_status_timeout(Duration::from_secs(timeout));

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(data.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
        );
        bar
    };

    let verdict = uploader.upload(&data, |sent, _total| progress.set_position(sent))?;
    progress.finish_and_clear();

    match verdict {
        UploadStatus::Success => {
            if !cli.quiet {
                eprintln!(
                    "{} upload accepted, device is restarting into the new image",
                    style("ok").green().bold()
                );
            }
            Ok(())
        },
        status => {
            bail!("device rejected the image (reported {status})")
        },
    }
}
