//! Periodic tick source.
//!
//! A named thread posts `EVENT_TIMER` on absolute deadlines so drift does
//! not accumulate. After a stall longer than one period the schedule
//! resynchronizes instead of firing a burst of catch-up ticks.

use hist_common::event::{EventSet, EVENT_TIMER};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Handle of the tick thread.
#[derive(Debug)]
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn the tick thread posting `EVENT_TIMER` every `interval`.
    ///
    /// # Errors
    ///
    /// Fails when the thread cannot be spawned.
    pub fn start(events: Arc<EventSet>, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        info!(interval_us = interval.as_micros() as u64, "starting ticker");
        let handle = thread::Builder::new()
            .name("hist-ticker".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                while !stop_flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                    if stop_flag.load(Ordering::Acquire) {
                        break;
                    }
                    events.post(EVENT_TIMER);
                    next += interval;
                    let now = Instant::now();
                    if now > next + interval {
                        // Stalled; skip the missed ticks
                        next = now + interval;
                    }
                }
                debug!("ticker stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
