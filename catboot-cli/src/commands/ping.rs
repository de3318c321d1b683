//! Ping command implementation.

use anyhow::{Context, Result};
use console::style;
use std::time::Duration;

use catboot::channel::{NativeChannel, SerialConfig};
use catboot::host::Uploader;

use crate::{Cli, get_port};

/// Ping the bootloader and print the status it reports.
pub(crate) fn cmd_ping(cli: &Cli) -> Result<()> {
    let port = get_port(cli)?;
    let config = SerialConfig::new(&port, cli.baud);
    let channel = NativeChannel::open(&config)
        .with_context(|| format!("failed to open {port}"))?;

    let mut uploader = Uploader::new(channel).with_status_timeout(Duration::from_secs(3));
    let status = uploader
        .ping()
        .context("no answer from the bootloader (is the device in boot mode?)")?;

    println!("{status}");
    if !cli.quiet {
        eprintln!("{} bootloader on {port} reports {status}", style("ok").green().bold());
    }
    Ok(())
}
