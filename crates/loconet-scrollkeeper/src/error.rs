//! Error types for Scrollkeeper operations.

use thiserror::Error;

/// Errors surfaced from [`crate::Scrollkeeper`] queries and commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrollError {
    /// A command targeted an address with no known slot/switch and the
    /// bounded status-request retry loop gave up.
    #[error("no entity known for address {address} after {attempts} status request(s)")]
    UnknownEntity {
        /// The address that was never resolved.
        address: u16,
        /// How many status-request attempts were made.
        attempts: u32,
    },

    /// A `wait_for_*` call's deadline elapsed before the desired state was
    /// observed.
    #[error("timed out waiting for the desired state")]
    Timeout,

    /// A caller-supplied argument was out of range (e.g. a function index
    /// outside 0..=28).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying Interface rejected a command because it is closed.
    #[error("interface closed: {0}")]
    InterfaceClosed(String),
}

/// Convenience alias for Scrollkeeper results.
pub type Result<T> = std::result::Result<T, ScrollError>;
