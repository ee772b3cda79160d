//! Opcode → length-class table.
//!
//! Bits 7..5 of a LocoNet opcode byte give its length class directly; this
//! holds for every byte in `0x80..=0xff`; there is no opcode without a class.

use crate::error::{CodecError, Result};

/// How many bytes a frame occupies, derived from opcode bits 7..5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    /// `0b100` — 2 bytes total (opcode + checksum).
    Two,
    /// `0b101` — 4 bytes total.
    Four,
    /// `0b110` — 6 bytes total.
    Six,
    /// `0b111` — variable length; byte\[1\] holds the total frame length.
    Variable,
}

impl LengthClass {
    /// Fixed frame length, if this class isn't `Variable`.
    #[must_use]
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Two => Some(2),
            Self::Four => Some(4),
            Self::Six => Some(6),
            Self::Variable => None,
        }
    }
}

/// Derive the length class for an opcode byte.
///
/// # Errors
/// Returns `UnknownLengthClass` if `opcode` has its MSB clear (not an
/// opcode at all) — callers that already checked the MSB never see this.
pub fn length_class(opcode: u8) -> Result<LengthClass> {
    if opcode & 0x80 == 0 {
        return Err(CodecError::NotAnOpcode(opcode));
    }
    match (opcode >> 5) & 0b111 {
        0b100 => Ok(LengthClass::Two),
        0b101 => Ok(LengthClass::Four),
        0b110 => Ok(LengthClass::Six),
        0b111 => Ok(LengthClass::Variable),
        _ => Err(CodecError::UnknownLengthClass(opcode)),
    }
}

/// Symbolic opcode constants (spec.md §6.1, normative subset).
pub mod op {
    /// Global power busy.
    pub const GPBUSY: u8 = 0x81;
    /// Global power off.
    pub const GPOFF: u8 = 0x82;
    /// Global power on.
    pub const GPON: u8 = 0x83;
    /// Locomotive speed.
    pub const LOCO_SPD: u8 = 0xA0;
    /// Locomotive direction + F0..F4.
    pub const LOCO_DIRF: u8 = 0xA1;
    /// Locomotive F5..F8.
    pub const LOCO_SND: u8 = 0xA2;
    /// Locomotive F9..F12.
    pub const LOCO_F9F12: u8 = 0xA3;
    /// Switch request (throw/close a turnout).
    pub const SW_REQ: u8 = 0xB0;
    /// Switch state reply.
    pub const SW_REP: u8 = 0xB1;
    /// Sensor input report.
    pub const INPUT_REP: u8 = 0xB2;
    /// Request current switch state (not in the normative table verbatim;
    /// the well-known Digitrax request opcode used to trigger a `SW_REP`).
    pub const SW_STATE_REQ: u8 = 0xBC;
    /// Long acknowledge.
    pub const LONG_ACK: u8 = 0xB4;
    /// Locomotive address request (also requests/allocates a slot).
    pub const LOCO_ADR: u8 = 0xBF;
    /// Capture timestamp pseudo-message.
    pub const CAPTURE_TIMESTAMP: u8 = 0xC0;
    /// Slot read data.
    pub const SLOT_RD_DATA: u8 = 0xE7;
    /// Immediate DCC packet (used for F13..F28 feature-expansion payloads).
    pub const IMM_PACKET: u8 = 0xED;
}
