//! Downlink monitor command implementation.
//!
//! Prints console text as it arrives and renders status frames as
//! highlighted lines. Ctrl-C exits.

use anyhow::{Context, Result};
use console::style;
use std::io::{Read as _, Write as _};
use std::time::Duration;

use catboot::channel::{Channel as _, NativeChannel, SerialConfig};
use catboot::monitor::{MonitorEvent, TelemetryScanner};
use catboot::wire::UploadStatus;

use crate::{Cli, get_port};

/// Watch the status/console downlink until interrupted.
pub(crate) fn cmd_monitor(cli: &Cli) -> Result<()> {
    let port = get_port(cli)?;
    let config = SerialConfig::new(&port, cli.baud).with_timeout(Duration::from_millis(100));
    let mut channel = NativeChannel::open(&config)
        .with_context(|| format!("failed to open {port}"))?;

    if !cli.quiet {
        eprintln!(
            "{} monitoring {} at {} baud (Ctrl-C to exit)",
            style("~").cyan(),
            style(&port).cyan(),
            cli.baud
        );
    }

    let mut scanner = TelemetryScanner::new();
    let mut buf = [0u8; 256];
    let stdout = std::io::stdout();

    while !catboot::is_interrupt_requested() {
        let n = match channel.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                continue;
            },
            Err(e) => return Err(e).context("downlink read failed"),
        };
        if n == 0 {
            continue;
        }

        let mut out = stdout.lock();
        for event in scanner.push(&buf[..n]) {
            match event {
                MonitorEvent::Text(text) => {
                    out.write_all(text.as_bytes())?;
                    out.flush()?;
                },
                MonitorEvent::Status(status) => {
                    let label = match status {
                        UploadStatus::Success => style(status).green().bold(),
                        UploadStatus::Failure => style(status).red().bold(),
                        _ => style(status).cyan(),
                    };
                    eprintln!("{} status: {label}", style("*").magenta());
                },
            }
        }
    }

    channel.close()?;
    Ok(())
}
