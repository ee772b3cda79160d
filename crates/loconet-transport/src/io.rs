//! Byte source/sink abstraction.
//!
//! A real `serialport::SerialPort`, a `std::fs::File` opened for replay, an
//! in-memory loopback, or `std::io::{empty, sink}` for dummy mode all satisfy
//! these traits without any wrapper boilerplate — they're blanket
//! implementations over `Read`/`Write`.

use std::io::{Read, Write};

/// Anything the reader worker can pull raw bytes from.
pub trait ByteSource: Read + Send {}
impl<T: Read + Send> ByteSource for T {}

/// Anything the writer worker can push encoded frames to.
pub trait ByteSink: Write + Send {}
impl<T: Write + Send> ByteSink for T {}
