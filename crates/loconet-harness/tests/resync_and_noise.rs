//! Property 4 and scenario B (spec.md §8): a byte stream salted with
//! MSB-clear noise and reversed, truncated copies of real frames must still
//! yield exactly the real frames, in order, with nothing spurious emitted.

use loconet_proto::{Framer, Message, SensorState};

#[test]
fn noisy_interleaved_stream_yields_only_the_real_frames() {
    let frames = [
        Message::GpOn,
        Message::InputRep { sensor: 12, state: SensorState::Active },
        Message::GpOff,
        Message::InputRep { sensor: 12, state: SensorState::Inactive },
    ];

    let mut stream = Vec::new();
    for frame in &frames {
        // Stray, MSB-clear noise ahead of every real frame: the framer must
        // discard it silently rather than attempt to interpret it.
        stream.extend([0x42, 0x00, 0x7f]);

        let mut encoded = frame.encode();
        // A reversed, truncated copy of the previous frame's tail bytes,
        // re-encoded with the noise's MSB-clear marker so it can never be
        // mistaken for a fresh opcode.
        let mut reversed_noise: Vec<u8> = encoded.iter().rev().map(|b| b & 0x7f).collect();
        stream.append(&mut reversed_noise);

        stream.append(&mut encoded);
    }

    let mut framer = Framer::new();
    framer.push(&stream);

    let mut decoded = Vec::new();
    while let Some(msg) = framer.next_message() {
        decoded.push(msg);
    }

    assert_eq!(decoded, frames);
    assert_eq!(framer.truncated_frames(), 0);
    assert_eq!(framer.checksum_failures(), 0);
}

#[test]
fn scenario_b_resync_after_two_stray_bytes() {
    // Two genuinely MSB-clear bytes ahead of a real frame (spec.md §8
    // scenario B): the framer must discard both silently and still decode
    // the frame that follows.
    let expected = Message::InputRep { sensor: 12, state: SensorState::Active };
    let mut stream = vec![0x42, 0x63];
    stream.extend(expected.encode());

    let mut framer = Framer::new();
    framer.push(&stream);

    assert_eq!(framer.next_message(), Some(expected));
    assert_eq!(framer.next_message(), None);
    assert_eq!(framer.stray_bytes(), 2);
}
