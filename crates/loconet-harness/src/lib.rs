//! Test fixtures shared by this workspace's integration tests: an
//! in-memory duplex byte pipe standing in for a serial cable, and a helper
//! for wiring two [`Interface`]s back to back (spec.md §8).

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use loconet_transport::{Interface, PacingMode};

const PIPE_POLL: Duration = Duration::from_millis(50);

struct PipeInner {
    buf: Mutex<VecDeque<u8>>,
    ready: Condvar,
    closed: AtomicBool,
}

impl PipeInner {
    fn new() -> Self {
        Self { buf: Mutex::new(VecDeque::new()), ready: Condvar::new(), closed: AtomicBool::new(false) }
    }
}

/// Read end of an in-memory pipe. Blocks briefly waiting for data, then
/// returns `WouldBlock` so callers polling a shutdown flag (as
/// `Interface`'s reader worker does) stay responsive.
pub struct PipeReader(Arc<PipeInner>);

/// Write end of an in-memory pipe. Dropping it marks the pipe closed, which
/// surfaces as EOF (`Ok(0)`) on the paired [`PipeReader`].
pub struct PipeWriter(Arc<PipeInner>);

impl Read for PipeReader {
    #[allow(clippy::expect_used)]
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let mut buf = self.0.buf.lock().expect("pipe buffer mutex poisoned");
        loop {
            if !buf.is_empty() {
                let n = out.len().min(buf.len());
                for slot in out.iter_mut().take(n) {
                    if let Some(byte) = buf.pop_front() {
                        *slot = byte;
                    }
                }
                return Ok(n);
            }
            if self.0.closed.load(Ordering::Acquire) {
                return Ok(0);
            }
            let (guard, timed_out) = self
                .0
                .ready
                .wait_timeout(buf, PIPE_POLL)
                .expect("pipe condvar poisoned");
            buf = guard;
            if timed_out.timed_out() && buf.is_empty() {
                return Err(std::io::Error::from(std::io::ErrorKind::WouldBlock));
            }
        }
    }
}

impl Write for PipeWriter {
    #[allow(clippy::expect_used)]
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self.0.buf.lock().expect("pipe buffer mutex poisoned");
        buf.extend(data.iter().copied());
        drop(buf);
        self.0.ready.notify_all();
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::Release);
        self.0.ready.notify_all();
    }
}

/// Build one end of an in-memory pipe. Holding the returned [`PipeWriter`]
/// (even without ever writing to it) keeps the paired [`PipeReader`] from
/// observing EOF, unlike `std::io::empty()` — useful for exercising a
/// reader worker that should sit idle rather than shut itself down.
#[must_use]
pub fn pipe_pair() -> (PipeReader, PipeWriter) {
    let inner = Arc::new(PipeInner::new());
    (PipeReader(Arc::clone(&inner)), PipeWriter(inner))
}

/// Build a pair of Interfaces wired directly to one another, as if by a
/// null-modem cable: everything `a` sends arrives at `b`'s inbound
/// callbacks, and vice versa.
#[must_use]
pub fn loopback_interfaces() -> (Arc<Interface>, Arc<Interface>) {
    let a_to_b = Arc::new(PipeInner::new());
    let b_to_a = Arc::new(PipeInner::new());

    let a = Interface::open(
        Box::new(PipeReader(Arc::clone(&b_to_a))),
        Box::new(PipeWriter(Arc::clone(&a_to_b))),
        None,
        PacingMode::FastAsPossible,
    );
    let b = Interface::open(
        Box::new(PipeReader(Arc::clone(&a_to_b))),
        Box::new(PipeWriter(Arc::clone(&b_to_a))),
        None,
        PacingMode::FastAsPossible,
    );
    (a, b)
}
