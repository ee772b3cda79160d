//! Error types for the Interface transceiver.

use thiserror::Error;

/// Errors surfaced from [`crate::Interface`] operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The interface has stopped (transport EOF, write failure, or an
    /// explicit `shutdown()`); no further sends will be accepted.
    #[error("interface is closed")]
    InterfaceClosed,

    /// Underlying byte-stream I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure opening or configuring a serial port.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Convenience alias for transport results.
pub type Result<T> = std::result::Result<T, TransportError>;
