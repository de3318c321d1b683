//! catboot CLI - uplink tool for the CatSat serial bootloader.
//!
//! ## Features
//!
//! - Upload firmware images over the serial uplink
//! - Ping the bootloader and report its status
//! - Watch the status/console downlink
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use catboot::channel::{NativeEnumerator, PortEnumerator};

mod commands;

use commands::{completions, monitor, ping, ports, upload};

/// catboot - upload firmware to the CatSat serial bootloader.
///
/// Environment variables:
///   CATBOOT_PORT   - Default serial port
///   CATBOOT_BAUD   - Default baud rate (default: 9600)
#[derive(Parser)]
#[command(name = "catboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/catsat-avionics/catboot")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "CATBOOT_PORT")]
    port: Option<String>,

    /// Baud rate of the bootloader links.
    #[arg(short, long, global = true, default_value = "9600", env = "CATBOOT_BAUD")]
    baud: u32,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload a firmware image to the bootloader.
    Upload {
        /// Path to the raw binary image.
        image: PathBuf,

        /// Data bytes per frame (1-254).
        #[arg(long, default_value = "128")]
        chunk_size: usize,

        /// Seconds to wait for the device's verdict.
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Watch the downlink after a successful upload.
        #[arg(long)]
        monitor: bool,
    },

    /// Ping the bootloader and print its reported status.
    Ping,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Watch the status/console downlink.
    Monitor,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "catboot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Ctrl-C aborts the library's blocking waits instead of killing us
    // mid-frame.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                // Second Ctrl-C: give up waiting and exit hard.
                std::process::exit(130);
            }
            eprintln!("\n{} interrupt requested, stopping...", style("!").yellow().bold());
        })?;
    }
    let flag = Arc::clone(&interrupted);
    catboot::set_interrupt_checker(move || flag.load(Ordering::SeqCst));

    match &cli.command {
        Commands::Upload {
            image,
            chunk_size,
            timeout,
            monitor,
        } => {
            upload::cmd_upload(&cli, image, *chunk_size, *timeout)?;
            if *monitor {
                eprintln!();
                monitor::cmd_monitor(&cli)?;
            }
        },
        Commands::Ping => {
            ping::cmd_ping(&cli)?;
        },
        Commands::ListPorts { json } => {
            ports::cmd_list_ports(*json)?;
        },
        Commands::Monitor => {
            monitor::cmd_monitor(&cli)?;
        },
        Commands::Completions { shell } => {
            completions::cmd_completions(*shell);
        },
    }

    Ok(())
}

/// Get serial port from CLI args or auto-detection.
fn get_port(cli: &Cli) -> Result<String> {
    if let Some(port) = &cli.port {
        return Ok(port.clone());
    }

    let ports = NativeEnumerator::list_ports()?;
    match ports.as_slice() {
        [] => bail!("no serial ports found; specify one with --port"),
        [only] => {
            if !cli.quiet {
                eprintln!(
                    "{} auto-detected port {}",
                    style("i").blue(),
                    style(&only.name).cyan()
                );
            }
            Ok(only.name.clone())
        },
        many => {
            let names: Vec<&str> = many.iter().map(|p| p.name.as_str()).collect();
            bail!(
                "multiple serial ports found ({}); specify one with --port",
                names.join(", ")
            )
        },
    }
}
