//! The LocoNet message family: opcode table, checksum, frame encode/decode,
//! and the byte-stream resync state machine used by `loconet-transport`'s
//! reader worker.

mod error;
mod framer;
mod message;
mod opcode;

pub use error::{CodecError, Result};
pub use framer::Framer;
pub use message::{
    checksum, verify_checksum, ConsistState, Direction, Message, SensorState, SlotStatus,
    ThrownState,
};
pub use opcode::{length_class, op, LengthClass};
