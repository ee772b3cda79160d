//! Capture file sink and replay pacing (spec.md §4.4).
//!
//! The capture file is a flat, append-only concatenation of raw LocoNet
//! frames in reception/transmission order — no header, no index. With
//! timestamps enabled, a synthetic `CaptureTimeStamp` frame precedes every
//! captured frame so a later realtime replay can reproduce the original
//! inter-frame gaps.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use loconet_proto::Message;

/// Shared sink for captured traffic; written from the reader and writer
/// workers, serialized by its own lock so neither worker blocks the other
/// longer than a single frame write.
pub struct CaptureSink {
    inner: Mutex<Box<dyn Write + Send>>,
    with_timestamps: bool,
}

impl CaptureSink {
    /// Wrap `sink` as a capture destination. When `with_timestamps` is set,
    /// every captured frame is preceded by a `CaptureTimeStamp` pseudo-frame.
    #[must_use]
    pub fn new(sink: Box<dyn Write + Send>, with_timestamps: bool) -> Self {
        Self { inner: Mutex::new(sink), with_timestamps }
    }

    /// Whether this sink prefixes frames with timestamps.
    #[must_use]
    pub fn with_timestamps(&self) -> bool {
        self.with_timestamps
    }

    /// Append one already-encoded frame (and, if timestamps are enabled, a
    /// preceding `CaptureTimeStamp` for `elapsed`) to the capture file.
    ///
    /// # Panics
    ///
    /// Panics if the sink's internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn write_frame(&self, frame: &[u8], elapsed: Duration) {
        let mut sink = self.inner.lock().expect("CaptureSink mutex poisoned");
        if self.with_timestamps {
            let ts = elapsed_to_timestamp(elapsed);
            if let Err(err) = sink.write_all(&ts.encode()) {
                tracing::warn!(%err, "capture sink write failed (timestamp)");
                return;
            }
        }
        if let Err(err) = sink.write_all(frame) {
            tracing::warn!(%err, "capture sink write failed (frame)");
        }
    }

    /// Flush and drop the underlying writer.
    ///
    /// # Panics
    ///
    /// Panics if the sink's internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn flush(&self) {
        let mut sink = self.inner.lock().expect("CaptureSink mutex poisoned");
        if let Err(err) = sink.flush() {
            tracing::warn!(%err, "capture sink flush failed");
        }
    }
}

fn elapsed_to_timestamp(elapsed: Duration) -> Message {
    let total_hundredths = elapsed.as_millis() / 10;
    let ff = (total_hundredths % 100) as u8;
    let total_secs = total_hundredths / 100;
    let ss = (total_secs % 60) as u8;
    let total_mins = total_secs / 60;
    let mm = (total_mins % 60) as u8;
    let hh = (total_mins / 60 % 24) as u8;
    Message::CaptureTimeStamp { hh, mm, ss, ff }
}

/// Convert a `CaptureTimeStamp` back into an elapsed duration from midnight,
/// for computing inter-frame gaps during realtime replay.
#[must_use]
pub fn timestamp_to_elapsed(msg: &Message) -> Option<Duration> {
    let Message::CaptureTimeStamp { hh, mm, ss, ff } = *msg else { return None };
    let total_ms = u64::from(hh) * 3_600_000
        + u64::from(mm) * 60_000
        + u64::from(ss) * 1_000
        + u64::from(ff) * 10;
    Some(Duration::from_millis(total_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_roundtrips_through_timestamp() {
        let elapsed = Duration::from_millis(3_725_340); // 1h 2m 5s 34 (x10ms)
        let ts = elapsed_to_timestamp(elapsed);
        let back = timestamp_to_elapsed(&ts).unwrap();
        // Sub-10ms precision is lost by design (ff is hundredths of a second).
        assert!(back.as_millis().abs_diff(elapsed.as_millis()) < 10);
    }

    #[test]
    fn write_frame_without_timestamps() {
        let buf: Vec<u8> = Vec::new();
        let sink = CaptureSink::new(Box::new(buf), false);
        sink.write_frame(&[0x83, 0x7c], Duration::from_secs(1));
        sink.flush();
    }
}
