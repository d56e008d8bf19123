//! Error types for the vehicle server

use std::io;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ServerError>;

/// Failures that stop the server or its listener
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening endpoint could not be opened
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The accept loop hit a non-transient error
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Rule violations reported by the vehicle model.
///
/// The `Display` text is sent verbatim after `ERR `.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpeedError {
    #[error("battery low")]
    BatteryLow,
    #[error("min speed")]
    MinSpeed,
    #[error("max speed")]
    MaxSpeed,
}
