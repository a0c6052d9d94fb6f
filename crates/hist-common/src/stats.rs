//! Self-telemetry accumulators.
//!
//! Each accumulator keeps a running `(sum, count, max, all_time_max)` over
//! unsigned observations (microseconds in practice). A flush snapshots and
//! resets everything except the all-time maximum, which survives for the
//! lifetime of the process.
//!
//! The fields are atomics because one accumulator (`influx_persist`) is
//! collected from the submitter thread while the sampler thread flushes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running summary of unsigned observations.
#[derive(Debug, Default)]
pub struct StatAccumulator {
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
    all_time_max: AtomicU64,
}

impl StatAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
            all_time_max: AtomicU64::new(0),
        }
    }

    /// Record one observation.
    pub fn collect(&self, x: u64) {
        self.sum.fetch_add(x, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(x, Ordering::Relaxed);
        self.all_time_max.fetch_max(x, Ordering::Relaxed);
    }

    /// Read the current values without resetting.
    #[must_use]
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            sum: self.sum.load(Ordering::Acquire),
            count: self.count.load(Ordering::Acquire),
            max: self.max.load(Ordering::Acquire),
            all_time_max: self.all_time_max.load(Ordering::Acquire),
        }
    }

    /// Snapshot the window and reset `sum`, `count` and `max`.
    ///
    /// `all_time_max` is left untouched and never resets.
    #[must_use]
    pub fn flush(&self) -> StatSnapshot {
        StatSnapshot {
            sum: self.sum.swap(0, Ordering::AcqRel),
            count: self.count.swap(0, Ordering::AcqRel),
            max: self.max.swap(0, Ordering::AcqRel),
            all_time_max: self.all_time_max.load(Ordering::Acquire),
        }
    }
}

/// Immutable view of one accumulator window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Sum of all observations in the window.
    pub sum: u64,
    /// Number of observations in the window.
    pub count: u64,
    /// Largest observation in the window.
    pub max: u64,
    /// Largest observation since process start.
    pub all_time_max: u64,
}

impl StatSnapshot {
    /// Mean of the window, or `None` when the window is empty.
    #[must_use]
    pub fn avg(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum as f64 / self.count as f64)
        } else {
            None
        }
    }
}

/// The bridge's five timing accumulators, all in microseconds.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Spacing between consecutive tick entries.
    pub interval: StatAccumulator,
    /// Tick entry to end of the slot scan.
    pub duration: StatAccumulator,
    /// One UDP batch send in the submitter.
    pub influx_persist: StatAccumulator,
    /// One line-protocol encode+append on the sampler thread.
    pub influx_enqueue: StatAccumulator,
    /// One pub/sub encode+publish on the sampler thread.
    pub zmq_enqueue: StatAccumulator,
}

impl BridgeStats {
    /// Create a zeroed statistics block.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interval: StatAccumulator::new(),
            duration: StatAccumulator::new(),
            influx_persist: StatAccumulator::new(),
            influx_enqueue: StatAccumulator::new(),
            zmq_enqueue: StatAccumulator::new(),
        }
    }

    /// All accumulators with their measurement names, in flush order.
    #[must_use]
    pub fn accumulators(&self) -> [(&'static str, &StatAccumulator); 5] {
        [
            ("interval", &self.interval),
            ("duration", &self.duration),
            ("influx_persist", &self.influx_persist),
            ("influx_enqueue", &self.influx_enqueue),
            ("zmq_enqueue", &self.zmq_enqueue),
        ]
    }
}
