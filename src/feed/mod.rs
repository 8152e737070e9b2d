//! # feed
//!
//! The uniform [`MarketFeed`] contract and the single-slot delivery machinery
//! shared by every implementation.
//!
//! ## Contract
//! - `on_tick` is never called before `subscribe`.
//! - Exactly one call per logical sample, never batched.
//! - One subscriber at a time: the last `subscribe` wins.
//! - `stop()` is idempotent, safe without a prior `subscribe`, callable from
//!   inside `on_tick`, and once it returns no further callback fires.

pub mod generator;
pub mod live;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::warn;

use crate::models::Tick;

pub use generator::TickGenerator;
pub use live::LiveFeed;

pub type TickHandler = Box<dyn FnMut(Tick) + Send + 'static>;

pub trait MarketFeed: Send + Sync {
    fn subscribe(&self, on_tick: TickHandler);
    fn stop(&self);
    /// Short label for logs.
    fn name(&self) -> &'static str;
}

// ─── DeliverySlot ─────────────────────────────────────────────────────────────

struct SlotInner {
    handler: Option<TickHandler>,
    stopped: bool,
    /// Bumped on every `install` so a handler replaced mid-callback is dropped.
    generation: u64,
}

/// Holds the current subscriber and serialises deliveries.
///
/// The handler is taken out of the slot while it runs, so it may call
/// `subscribe` / `stop` on its own feed without deadlocking.
pub(crate) struct DeliverySlot {
    inner: Mutex<SlotInner>,
    /// Held for the whole duration of a callback.
    delivery: Mutex<()>,
    /// Thread currently running a callback, to detect re-entrant `close`.
    delivering_on: Mutex<Option<ThreadId>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeliverySlot {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner { handler: None, stopped: false, generation: 0 }),
            delivery: Mutex::new(()),
            delivering_on: Mutex::new(None),
        }
    }

    /// Stores `handler`, replacing any previous one.  `false` once closed.
    pub(crate) fn install(&self, feed: &'static str, handler: TickHandler) -> bool {
        let mut inner = lock(&self.inner);
        if inner.stopped {
            warn!(feed, "subscribe after stop ignored");
            return false;
        }
        if inner.handler.is_some() {
            warn!(feed, "replacing existing subscriber (last subscribe wins)");
        }
        inner.handler = Some(handler);
        inner.generation += 1;
        true
    }

    pub(crate) fn is_stopped(&self) -> bool {
        lock(&self.inner).stopped
    }

    /// Hands `tick` to the subscriber.  Returns `false` once the slot is closed.
    pub(crate) fn deliver(&self, tick: Tick) -> bool {
        let _delivering = lock(&self.delivery);

        let (mut handler, generation) = {
            let mut inner = lock(&self.inner);
            if inner.stopped {
                return false;
            }
            match inner.handler.take() {
                Some(h) => (h, inner.generation),
                None => return true,
            }
        };

        *lock(&self.delivering_on) = Some(thread::current().id());
        handler(tick);
        *lock(&self.delivering_on) = None;

        let mut inner = lock(&self.inner);
        if !inner.stopped && inner.generation == generation && inner.handler.is_none() {
            inner.handler = Some(handler);
        }
        !inner.stopped
    }

    /// Closes the slot and drops the subscriber.  Returns `true` on the first call.
    ///
    /// Waits for a callback in flight on another thread; a call from inside
    /// the callback itself returns immediately.
    pub(crate) fn close(&self) -> bool {
        let (first, handler) = {
            let mut inner = lock(&self.inner);
            let first = !inner.stopped;
            inner.stopped = true;
            (first, inner.handler.take())
        };
        drop(handler);

        let reentrant = *lock(&self.delivering_on) == Some(thread::current().id());
        if !reentrant {
            drop(lock(&self.delivery));
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, TickHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: TickHandler = Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn nothing_delivered_without_subscriber() {
        let slot = DeliverySlot::new();
        assert!(slot.deliver(Tick::new(1, 1.0)));
    }

    #[test]
    fn last_install_wins() {
        let slot = DeliverySlot::new();
        let (a, ha) = counter();
        let (b, hb) = counter();
        assert!(slot.install("test", ha));
        slot.deliver(Tick::new(1, 1.0));
        assert!(slot.install("test", hb));
        slot.deliver(Tick::new(2, 1.0));
        slot.deliver(Tick::new(3, 1.0));
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let slot = DeliverySlot::new();
        assert!(slot.close());
        assert!(!slot.close());
        let (count, h) = counter();
        assert!(!slot.install("test", h));
        assert!(!slot.deliver(Tick::new(1, 1.0)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_from_inside_callback() {
        let slot = Arc::new(DeliverySlot::new());
        let count = Arc::new(AtomicUsize::new(0));
        let (s, c) = (Arc::clone(&slot), Arc::clone(&count));
        slot.install("test", Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            s.close();
        }));
        assert!(!slot.deliver(Tick::new(1, 1.0)));
        assert!(!slot.deliver(Tick::new(2, 1.0)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(slot.is_stopped());
    }

    #[test]
    fn close_from_other_thread_waits_for_callback_in_flight() {
        let slot = Arc::new(DeliverySlot::new());
        let started = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (s, r) = (Arc::clone(&started), Arc::clone(&running));
        slot.install("test", Box::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            r.store(true, Ordering::SeqCst);
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(50));
            r.store(false, Ordering::SeqCst);
        }));

        let deliverer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let mut time = 0;
                while slot.deliver(Tick::new(time, 1.0)) {
                    time += 1;
                }
            })
        };

        entered_rx.recv().unwrap();
        assert!(slot.close());
        assert!(!running.load(Ordering::SeqCst), "close returned mid-callback");
        let after_close = started.load(Ordering::SeqCst);

        deliverer.join().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(started.load(Ordering::SeqCst), after_close);
    }

    #[test]
    fn resubscribe_from_inside_callback_replaces_handler() {
        let slot = Arc::new(DeliverySlot::new());
        let (b, hb) = counter();
        let hb = Mutex::new(Some(hb));
        let s = Arc::clone(&slot);
        slot.install("test", Box::new(move |_| {
            if let Some(h) = lock(&hb).take() {
                s.install("test", h);
            }
        }));
        slot.deliver(Tick::new(1, 1.0));
        slot.deliver(Tick::new(2, 1.0));
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }
}
