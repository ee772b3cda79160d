//! Interface: bridges the LocoNet message layer to a byte stream (real
//! serial port, capture file replay, or dummy), running the reader/writer/
//! dispatcher worker threads described in spec.md §4.2 and §5.

mod callbacks;
mod capture;
mod error;
mod interface;
mod io;

pub use callbacks::CallbackToken;
pub use capture::CaptureSink;
pub use error::{Result, TransportError};
pub use interface::{Interface, PacingMode};
pub use io::{ByteSink, ByteSource};
