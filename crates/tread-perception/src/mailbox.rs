//! Single-slot, latest-wins hand-off cell between the engine tick and the
//! vision worker.
//!
//! A producer that outpaces its consumer simply overwrites the pending value;
//! only the newest image (or result) is ever worth processing.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Store `value`, returning whatever unread value it replaced.  Values put
    /// after [`close`](Self::close) are dropped.
    pub fn put(&self, value: T) -> Option<T> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return None;
        }
        let replaced = slot.value.replace(value);
        self.ready.notify_one();
        replaced
    }

    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().value.take()
    }

    /// Block until a value arrives.  Returns `None` once the mailbox is closed
    /// and drained.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.value.take() {
                return Some(value);
            }
            if slot.closed {
                return None;
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Like [`take`](Self::take) but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.value.take() {
                return Some(value);
            }
            if slot.closed {
                return None;
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.value.take();
            }
        }
    }

    /// Wake every waiter and refuse further values.  A value already pending
    /// can still be taken.
    pub fn close(&self) {
        self.slot.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    pub fn has_value(&self) -> bool {
        self.slot.lock().value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn latest_value_wins() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.put(1), None);
        assert_eq!(mailbox.put(2), Some(1));
        assert!(mailbox.has_value());
        assert_eq!(mailbox.try_take(), Some(2));
        assert_eq!(mailbox.try_take(), None);
    }

    #[test]
    fn take_timeout_expires_when_empty() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        let start = Instant::now();
        assert_eq!(mailbox.take_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn take_wakes_on_put_from_other_thread() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = Arc::clone(&mailbox);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.put("frame");
        });
        assert_eq!(mailbox.take_timeout(Duration::from_secs(2)), Some("frame"));
        handle.join().unwrap();
    }

    #[test]
    fn close_releases_blocked_taker() {
        let mailbox: Arc<Mailbox<u32>> = Arc::new(Mailbox::new());
        let waiter = Arc::clone(&mailbox);
        let handle = thread::spawn(move || waiter.take());
        thread::sleep(Duration::from_millis(10));
        mailbox.close();
        assert_eq!(handle.join().unwrap(), None);
        assert!(mailbox.is_closed());
    }

    #[test]
    fn put_after_close_is_dropped() {
        let mailbox = Mailbox::new();
        mailbox.put(1);
        mailbox.close();
        mailbox.put(2);
        // The value that arrived before closing is still delivered.
        assert_eq!(mailbox.take(), Some(1));
        assert_eq!(mailbox.take(), None);
    }
}
