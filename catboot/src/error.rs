//! Error types for catboot.

use std::io;
use thiserror::Error;

/// Result type for catboot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for catboot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial channel, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Staging store failure (external non-volatile buffer).
    #[error("Staging store error: {0}")]
    Staging(String),

    /// Flash programming failure.
    #[error("Flash error: {0}")]
    Flash(String),

    /// Durable metadata store failure.
    #[error("Metadata store error: {0}")]
    Metadata(String),

    /// Protocol error on the upload or status channel.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation aborted by the embedding application (e.g. Ctrl-C).
    #[error("Interrupted")]
    Interrupted,

    /// Unsupported operation for this build or platform.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
