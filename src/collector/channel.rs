//! One-slot snapshot channel with drop-oldest publication.
//!
//! The publisher must never block on a slow consumer: a full slot has its
//! occupant replaced, so the consumer always wakes to the latest snapshot.
//! Closing the channel is how the driver signals termination.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    cond: Condvar,
}

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

/// Creates a connected publisher/consumer pair over a single slot.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState {
            value: None,
            closed: false,
        }),
        cond: Condvar::new(),
    });
    (Sender { slot: slot.clone() }, Receiver { slot })
}

/// Publishing side. Cloneable so a pass-through (e.g. the recorder) can
/// forward into its own downstream slot.
pub struct Sender<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Places a value in the slot, replacing any unconsumed occupant.
    /// Never blocks. Publishing after close is a no-op.
    pub fn publish(&self, value: T) {
        let mut state = match self.slot.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.closed {
            return;
        }
        state.value = Some(value);
        drop(state);
        self.slot.cond.notify_one();
    }

    /// Closes the channel. Idempotent; wakes any blocked consumer.
    pub fn close(&self) {
        let mut state = match self.slot.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.closed = true;
        drop(state);
        self.slot.cond.notify_all();
    }
}

/// Consuming side.
pub struct Receiver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Receiver<T> {
    /// Blocks until a value is available or the channel is closed.
    /// A value left in the slot at close time is still delivered.
    pub fn recv(&self) -> Option<T> {
        let mut state = match self.slot.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(v) = state.value.take() {
                return Some(v);
            }
            if state.closed {
                return None;
            }
            state = match self.slot.cond.wait(state) {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Takes the current value without blocking.
    pub fn try_recv(&self) -> Option<T> {
        let mut state = match self.slot.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.value.take()
    }

    /// Waits up to `timeout` for a value. `None` on timeout or closure.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = match self.slot.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(v) = state.value.take() {
                return Some(v);
            }
            if state.closed {
                return None;
            }
            let (next, result) = match self.slot.cond.wait_timeout(state, timeout) {
                Ok(r) => r,
                Err(poisoned) => {
                    let r = poisoned.into_inner();
                    (r.0, r.1)
                }
            };
            state = next;
            if result.timed_out() {
                return state.value.take();
            }
        }
    }

    /// True once the channel is closed (a final value may still be pending).
    pub fn is_closed(&self) -> bool {
        match self.slot.state.lock() {
            Ok(s) => s.closed,
            Err(poisoned) => poisoned.into_inner().closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drop_oldest_keeps_latest() {
        let (tx, rx) = channel();
        for i in 0..10 {
            tx.publish(i);
        }
        assert_eq!(rx.try_recv(), Some(9));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn fast_consumer_sees_every_value() {
        let (tx, rx) = channel();
        for i in 0..10 {
            tx.publish(i);
            assert_eq!(rx.try_recv(), Some(i));
        }
    }

    #[test]
    fn close_wakes_blocked_receiver() {
        let (tx, rx) = channel::<u32>();
        let handle = thread::spawn(move || rx.recv());
        tx.close();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn value_pending_at_close_is_delivered() {
        let (tx, rx) = channel();
        tx.publish(7);
        tx.close();
        assert_eq!(rx.recv(), Some(7));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn publish_after_close_is_ignored() {
        let (tx, rx) = channel();
        tx.close();
        tx.publish(1);
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn recv_timeout_expires_empty() {
        let (_tx, rx) = channel::<u32>();
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), None);
    }
}
