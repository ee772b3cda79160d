//! Error types for the LocoNet message codec.

use thiserror::Error;

/// Errors raised while decoding a single frame.
///
/// These are always recoverable at the framer level: a bad frame just gets
/// discarded and resync continues from the next byte. No opcode in `0x80..=0xFF`
/// lacks a defined length class, so `UnknownLengthClass` should never occur in
/// practice; it exists so decode stays total over all possible first bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes are available than the opcode's length class requires.
    #[error("frame too short: need {expected} bytes, have {actual}")]
    TooShort {
        /// Bytes required by the opcode's length class.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The XOR-fold of the frame does not equal `0xFF`.
    #[error("bad checksum: frame XOR-folds to {actual:#04x}, expected 0xff")]
    BadChecksum {
        /// The actual fold-XOR of the frame.
        actual: u8,
    },

    /// The first byte is not a valid opcode (MSB clear) where one was expected.
    #[error("byte {0:#04x} is not an opcode (MSB clear)")]
    NotAnOpcode(u8),

    /// Defensive: every `0x80..=0xff` opcode has a defined length class, so this
    /// should be unreachable, but decode stays total rather than panicking.
    #[error("opcode {0:#04x} has no defined length class")]
    UnknownLengthClass(u8),
}

/// Convenience alias for codec results.
pub type Result<T> = std::result::Result<T, CodecError>;
