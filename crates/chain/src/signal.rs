//! Scoped signal subscriptions.
//!
//! The chain engine announces applied transactions and accepted blocks via
//! signals. Subscriptions are scoped: dropping the [`SignalConnection`]
//! returned by [`Signal::connect`] removes the callback, guaranteeing no
//! callback outlives the state it captures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

struct Slot<T> {
    id: u64,
    callback: Box<dyn Fn(&T) + Send>,
}

/// A multicast signal carrying values of type `T`.
///
/// Callbacks run synchronously on the emitting thread, in connection
/// order. Callbacks must not connect or disconnect from within `emit`.
pub struct Signal<T> {
    slots: Arc<Mutex<Vec<Slot<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Signal<T> {
    /// Create a signal with no subscribers.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe. The callback stays connected until the returned guard is
    /// dropped.
    pub fn connect(&self, callback: impl Fn(&T) + Send + 'static) -> SignalConnection
    where
        T: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .lock()
            .expect("signal lock poisoned")
            .push(Slot { id, callback: Box::new(callback) });

        let weak: Weak<Mutex<Vec<Slot<T>>>> = Arc::downgrade(&self.slots);
        SignalConnection {
            disconnect: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots
                        .lock()
                        .expect("signal lock poisoned")
                        .retain(|slot| slot.id != id);
                }
            })),
        }
    }

    /// Invoke every connected callback with `value`.
    pub fn emit(&self, value: &T) {
        let slots = self.slots.lock().expect("signal lock poisoned");
        for slot in slots.iter() {
            (slot.callback)(value);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().expect("signal lock poisoned").len()
    }
}

/// Scoped subscription guard; dropping it disconnects the callback.
pub struct SignalConnection {
    disconnect: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for SignalConnection {
    fn drop(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_subscriber() {
        let signal = Signal::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _conn = signal.connect(move |v| {
            seen2.fetch_add(*v as usize, Ordering::Relaxed);
        });

        signal.emit(&3);
        signal.emit(&4);
        assert_eq!(seen.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_drop_disconnects() {
        let signal = Signal::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let conn = signal.connect(move |_| {
            seen2.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(signal.subscriber_count(), 1);

        drop(conn);
        assert_eq!(signal.subscriber_count(), 0);
        signal.emit(&1);
        assert_eq!(seen.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_multiple_subscribers() {
        let signal = Signal::<()>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let a = seen.clone();
        let b = seen.clone();
        let _c1 = signal.connect(move |_| {
            a.fetch_add(1, Ordering::Relaxed);
        });
        let _c2 = signal.connect(move |_| {
            b.fetch_add(10, Ordering::Relaxed);
        });

        signal.emit(&());
        assert_eq!(seen.load(Ordering::Relaxed), 11);
    }
}
