//! Bit-flag event sets for inter-thread signalling.
//!
//! A single consumer blocks in [`EventSet::wait_any`]; any number of
//! producers post flags. Waits are unbounded - liveness comes from the
//! periodic timer. Flags are read-and-cleared atomically under the lock,
//! so no posted event is lost as long as the consumer keeps up.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Controller signalled that the parameterization phase ended.
pub const EVENT_READY_FOR_DATA: u32 = 1 << 0;
/// Periodic sampling tick.
pub const EVENT_TIMER: u32 = 1 << 1;
/// Alarm indication from the controller.
pub const EVENT_ALARM: u32 = 1 << 2;
/// Connection was aborted.
pub const EVENT_ABORT: u32 = 1 << 15;
/// A full line-protocol batch is ready for the submitter.
pub const EVENT_READY_FOR_SUBMIT: u32 = 1 << 0;
/// Worker thread should exit its loop.
pub const EVENT_SHUTDOWN: u32 = 1 << 31;

/// A set of event bit-flags with blocking wait.
#[derive(Debug, Default)]
pub struct EventSet {
    flags: Mutex<u32>,
    cond: Condvar,
}

impl EventSet {
    /// Create an empty event set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        // A poisoned lock only means a holder panicked; the u32 is still valid.
        self.flags.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Post one or more flags and wake the consumer.
    pub fn post(&self, bits: u32) {
        let mut flags = self.lock();
        *flags |= bits;
        self.cond.notify_all();
    }

    /// Block until any flag in `mask` is set, then clear and return those flags.
    pub fn wait_any(&self, mask: u32) -> u32 {
        let mut flags = self.lock();
        loop {
            let hit = *flags & mask;
            if hit != 0 {
                *flags &= !hit;
                return hit;
            }
            flags = self
                .cond
                .wait(flags)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`wait_any`](Self::wait_any) but gives up after `timeout`,
    /// returning 0 if nothing fired.
    pub fn wait_timeout(&self, mask: u32, timeout: Duration) -> u32 {
        let deadline = std::time::Instant::now() + timeout;
        let mut flags = self.lock();
        loop {
            let hit = *flags & mask;
            if hit != 0 {
                *flags &= !hit;
                return hit;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return 0;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(flags, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            flags = guard;
        }
    }

    /// Read the currently pending flags without clearing them.
    #[must_use]
    pub fn peek(&self) -> u32 {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_then_wait() {
        let ev = EventSet::new();
        ev.post(EVENT_TIMER);
        let got = ev.wait_any(EVENT_TIMER | EVENT_ABORT);
        assert_eq!(got, EVENT_TIMER);
        assert_eq!(ev.peek(), 0);
    }

    #[test]
    fn test_wait_clears_only_masked() {
        let ev = EventSet::new();
        ev.post(EVENT_TIMER | EVENT_ALARM);
        let got = ev.wait_any(EVENT_ALARM);
        assert_eq!(got, EVENT_ALARM);
        // TIMER still pending for a later wait
        assert_eq!(ev.peek(), EVENT_TIMER);
    }

    #[test]
    fn test_multiple_flags_in_one_wake() {
        let ev = EventSet::new();
        ev.post(EVENT_READY_FOR_DATA);
        ev.post(EVENT_TIMER);
        let got = ev.wait_any(EVENT_READY_FOR_DATA | EVENT_TIMER);
        assert_eq!(got, EVENT_READY_FOR_DATA | EVENT_TIMER);
    }

    #[test]
    fn test_wait_timeout_expires() {
        let ev = EventSet::new();
        let got = ev.wait_timeout(EVENT_TIMER, Duration::from_millis(20));
        assert_eq!(got, 0);
    }

    #[test]
    fn test_cross_thread_wake() {
        let ev = Arc::new(EventSet::new());
        let poster = Arc::clone(&ev);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            poster.post(EVENT_ABORT);
        });
        let got = ev.wait_any(EVENT_ABORT);
        assert_eq!(got, EVENT_ABORT);
        handle.join().unwrap();
    }
}
