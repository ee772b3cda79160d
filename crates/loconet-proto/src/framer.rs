//! Byte-stream resync state machine (spec.md §4.1).
//!
//! LocoNet is a master-free multi-drop bus; a listener may join mid-frame.
//! The MSB invariant (opcode bytes have it set, data bytes don't) is the
//! sole resync anchor, so the framer never trusts a length class until the
//! bytes inside it confirm there's no opcode hiding partway through.

use std::collections::VecDeque;

use crate::message::{verify_checksum, Message};
use crate::opcode::{length_class, LengthClass};

/// Incremental byte-stream framer. Feed it bytes as they arrive; pull
/// decoded messages out with [`Framer::next_message`].
#[derive(Debug, Default)]
pub struct Framer {
    buf: VecDeque<u8>,
    stray_bytes: u64,
    checksum_failures: u64,
    truncated_frames: u64,
}

impl Framer {
    /// A fresh framer with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-received bytes to the internal buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Count of stray MSB-clear bytes discarded while hunting for an opcode.
    #[must_use]
    pub fn stray_bytes(&self) -> u64 {
        self.stray_bytes
    }

    /// Count of frames abandoned because an opcode byte was found before
    /// the expected frame length was reached.
    #[must_use]
    pub fn truncated_frames(&self) -> u64 {
        self.truncated_frames
    }

    /// Count of well-framed candidates rejected by the checksum.
    #[must_use]
    pub fn checksum_failures(&self) -> u64 {
        self.checksum_failures
    }

    /// Pull the next fully-framed message out of the buffer, if one is
    /// ready. Returns `None` when the buffer holds no complete frame yet;
    /// call again after [`Framer::push`]ing more bytes.
    ///
    /// # Panics
    ///
    /// Panics if a buffered frame passes both the length-class and checksum
    /// checks yet still fails to decode; this would indicate the two are
    /// inconsistent with each other, which [`Message::decode`] never does.
    #[allow(clippy::expect_used)]
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let &opcode = self.buf.front()?;
            if opcode & 0x80 == 0 {
                self.buf.pop_front();
                self.stray_bytes += 1;
                continue;
            }

            // length_class never errors once the MSB is confirmed set.
            let class = length_class(opcode).ok()?;
            let expected = match class {
                LengthClass::Variable => {
                    let Some(&len) = self.buf.get(1) else { return None };
                    len as usize
                },
                _ => class.fixed_len().unwrap_or(2),
            };
            if expected < 2 {
                // A variable-class frame whose own length byte claims less
                // than the two bytes (opcode, checksum) every frame needs at
                // minimum; the length byte itself is noise.
                self.buf.pop_front();
                self.stray_bytes += 1;
                continue;
            }
            if self.buf.len() < expected {
                return None;
            }

            // Interior MSB-set byte means this frame was truncated; the
            // real next opcode starts there.
            if let Some(offset) = (1..expected).find(|&i| self.buf[i] & 0x80 != 0) {
                self.drain(offset);
                self.truncated_frames += 1;
                continue;
            }

            let frame: Vec<u8> = self.buf.iter().take(expected).copied().collect();
            if !verify_checksum(&frame) {
                self.buf.pop_front();
                self.checksum_failures += 1;
                continue;
            }

            let (msg, consumed) =
                Message::decode(&frame).expect("frame already passed length and checksum checks");
            debug_assert_eq!(consumed, expected);
            self.drain(expected);
            return Some(msg);
        }
    }

    fn drain(&mut self, n: usize) {
        self.buf.drain(..n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Direction, Message};

    #[test]
    fn discards_stray_data_bytes() {
        let mut f = Framer::new();
        f.push(&[0x01, 0x02, 0x03]);
        f.push(&Message::GpOn.encode());
        assert_eq!(f.next_message(), Some(Message::GpOn));
        assert_eq!(f.stray_bytes(), 3);
    }

    #[test]
    fn waits_for_more_bytes() {
        let mut f = Framer::new();
        let full = Message::LocoSpd { slot: 3, speed: 50 }.encode();
        f.push(&full[..2]);
        assert_eq!(f.next_message(), None);
        f.push(&full[2..]);
        assert_eq!(f.next_message(), Some(Message::LocoSpd { slot: 3, speed: 50 }));
    }

    #[test]
    fn interior_opcode_truncates_the_pending_frame() {
        let mut f = Framer::new();
        // LOCO_SPD claims 4 bytes, but byte[2] has its MSB set: the
        // original frame was cut short and a new opcode starts there.
        f.push(&[0xA0, 0x03, 0x90, 0x00]);
        f.push(&Message::GpOn.encode());
        assert_eq!(f.next_message(), Some(Message::GpOn));
        assert_eq!(f.truncated_frames(), 1);
    }

    #[test]
    fn bad_checksum_drops_one_byte_and_retries() {
        let mut f = Framer::new();
        let mut bad = Message::GpOn.encode();
        bad[1] ^= 0xff; // corrupt the checksum byte
        f.push(&bad);
        f.push(&Message::LocoDirF {
            slot: 1,
            direction: Direction::Forward,
            f0: true,
            f1: false,
            f2: false,
            f3: false,
            f4: false,
        }
        .encode());
        let msg = f.next_message();
        assert!(msg.is_some());
        assert!(f.checksum_failures() >= 1);
    }

    #[test]
    fn multiple_frames_in_one_push() {
        let mut f = Framer::new();
        let mut bytes = Message::GpOn.encode();
        bytes.extend(Message::GpOff.encode());
        f.push(&bytes);
        assert_eq!(f.next_message(), Some(Message::GpOn));
        assert_eq!(f.next_message(), Some(Message::GpOff));
        assert_eq!(f.next_message(), None);
    }
}
