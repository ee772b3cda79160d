//! Callback registry for dispatched inbound messages.
//!
//! Lock order is `callbacks → collection-lock`: the registry's own lock is
//! never held while a callback runs. [`CallbackRegistry::dispatch`] clones
//! the current callback list, releases the lock, then invokes each one —
//! so a callback that registers or unregisters another callback, or that
//! blocks on a Scrollkeeper collection lock, can never deadlock against the
//! registry itself.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use loconet_proto::Message;

/// Opaque handle returned by [`CallbackRegistry::register`], used to
/// unregister later.
pub type CallbackToken = u64;

type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

struct Entry {
    token: CallbackToken,
    callback: Callback,
}

/// Thread-safe, insertion-ordered collection of message callbacks.
#[derive(Default)]
pub struct CallbackRegistry {
    next_token: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl CallbackRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`, to be invoked (in insertion order) for every
    /// subsequently dispatched message. Returns a token for later removal.
    ///
    /// # Panics
    ///
    /// Panics if the registry's internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn register(&self, callback: impl Fn(&Message) + Send + Sync + 'static) -> CallbackToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().expect("CallbackRegistry mutex poisoned");
        entries.push(Entry { token, callback: Arc::new(callback) });
        token
    }

    /// Remove a previously registered callback. Idempotent: unregistering a
    /// token twice (or one that never existed) is not an error.
    ///
    /// # Panics
    ///
    /// Panics if the registry's internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn unregister(&self, token: CallbackToken) {
        let mut entries = self.entries.lock().expect("CallbackRegistry mutex poisoned");
        entries.retain(|e| e.token != token);
    }

    /// Invoke every registered callback with `msg`, in insertion order. A
    /// callback that panics is caught and logged; it never poisons the
    /// registry or stops the remaining callbacks from running.
    ///
    /// # Panics
    ///
    /// Panics if the registry's internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn dispatch(&self, msg: &Message) {
        let snapshot: Vec<Callback> = {
            let entries = self.entries.lock().expect("CallbackRegistry mutex poisoned");
            entries.iter().map(|e| Arc::clone(&e.callback)).collect()
        };
        for callback in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(msg)));
            if outcome.is_err() {
                tracing::warn!("interface callback panicked; continuing dispatch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn callbacks_run_in_insertion_order() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.register(move |_| order.lock().unwrap().push(i));
        }
        registry.dispatch(&Message::GpOn);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let token = registry.register(move |_| {
            hits2.fetch_add(1, Ordering::Relaxed);
        });
        registry.unregister(token);
        registry.unregister(token); // no panic, no-op
        registry.dispatch(&Message::GpOn);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn a_panicking_callback_does_not_stop_the_rest() {
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register(|_| panic!("boom"));
        let hits2 = Arc::clone(&hits);
        registry.register(move |_| {
            hits2.fetch_add(1, Ordering::Relaxed);
        });
        registry.dispatch(&Message::GpOn);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
