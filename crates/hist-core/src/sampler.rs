//! The cyclic worker: sample, diff, decode, hand off.
//!
//! One thread consumes the device event set. Timer ticks drive the scan;
//! ready-for-data arms the worker; alarms are acknowledged in place;
//! abort disarms and the loop continues (reconnection is the stack's
//! business). Every recoverable failure is absorbed here so the cadence
//! never breaks.

use crate::detect::scan_slot;
use crate::egress::Egress;
use crate::mirror::StateMirror;
use hist_common::event::{
    EventSet, EVENT_ABORT, EVENT_ALARM, EVENT_READY_FOR_DATA, EVENT_SHUTDOWN, EVENT_TIMER,
};
use hist_common::stats::BridgeStats;
use hist_common::time::now_micros;
use hist_fieldbus::catalog::{DataDirection, ModuleType, CUSTOM_SUBSLOT, MAX_OUTPUT_LEN};
use hist_fieldbus::device::ConnectionHandle;
use hist_fieldbus::registry::SlotRegistry;
use hist_fieldbus::{PnioStatus, ProcessImageProvider};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Lifecycle of the cyclic worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Waiting for a controller connection.
    #[default]
    Idle,
    /// Connection established; timer ticks run the scan.
    Armed,
}

/// The cyclic sampler. Sole writer of the state mirror and of the
/// line-protocol ring's write side.
pub struct Sampler {
    provider: Arc<dyn ProcessImageProvider>,
    registry: Arc<Mutex<SlotRegistry>>,
    connection: Arc<ConnectionHandle>,
    events: Arc<EventSet>,
    mirror: StateMirror,
    egress: Egress,
    stats: Arc<BridgeStats>,
    stats_interval: Duration,
    state: WorkerState,
    image: Box<[u8]>,
    last_tick_us: Option<i64>,
    last_flush: Instant,
}

impl Sampler {
    /// Assemble the worker around the shared bridge state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ProcessImageProvider>,
        registry: Arc<Mutex<SlotRegistry>>,
        connection: Arc<ConnectionHandle>,
        events: Arc<EventSet>,
        egress: Egress,
        stats: Arc<BridgeStats>,
        stats_interval: Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            connection,
            events,
            mirror: StateMirror::new(),
            egress,
            stats,
            stats_interval,
            state: WorkerState::Idle,
            image: vec![0u8; MAX_OUTPUT_LEN].into_boxed_slice(),
            last_tick_us: None,
            last_flush: Instant::now(),
        }
    }

    /// Current worker state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The egress fan-out (diagnostics, tests).
    #[must_use]
    pub fn egress(&self) -> &Egress {
        &self.egress
    }

    /// Consume the event set until shutdown.
    pub fn run(mut self) {
        info!("sampler started, waiting for connect request from controller");
        loop {
            let flags = self.events.wait_any(
                EVENT_READY_FOR_DATA | EVENT_TIMER | EVENT_ALARM | EVENT_ABORT | EVENT_SHUTDOWN,
            );
            // Serve whatever arrived with the shutdown before exiting
            self.service(flags & !EVENT_SHUTDOWN);
            if flags & EVENT_SHUTDOWN != 0 {
                break;
            }
        }
        info!("sampler stopped");
    }

    /// Handle one wake's worth of flags.
    ///
    /// Ready-for-data, alarms and abort are served before the timer. An
    /// abort disarms the worker, so a timer pending in the same wake
    /// still drives the stack's periodic work but runs no scan.
    pub fn service(&mut self, flags: u32) {
        if flags & EVENT_READY_FOR_DATA != 0 {
            self.on_ready_for_data();
        }
        if flags & EVENT_ALARM != 0 {
            self.on_alarm();
        }
        if flags & EVENT_ABORT != 0 {
            self.on_abort();
        }
        if flags & EVENT_TIMER != 0 {
            if self.state == WorkerState::Armed && self.connection.is_connected() {
                self.tick();
            }
            self.provider.handle_periodic();
        }
    }

    fn on_ready_for_data(&mut self) {
        let Some(arep) = self.connection.get() else {
            warn!("ready-for-data without a connection handle");
            return;
        };
        info!(arep, "signalling application ready for data");
        if let Err(e) = self.provider.application_ready(arep) {
            warn!(error = %e, "application_ready rejected - IOCS/IOPS set for all subslots?");
        }
        self.state = WorkerState::Armed;
    }

    fn on_alarm(&mut self) {
        let Some(arep) = self.connection.get() else {
            return;
        };
        match self.provider.alarm_send_ack(arep, PnioStatus::default()) {
            Ok(()) => debug!(arep, "alarm ack sent"),
            Err(e) => warn!(arep, error = %e, "alarm ack failed"),
        }
    }

    fn on_abort(&mut self) {
        self.connection.clear();
        self.connection.set_alarm_allowed(true);
        self.state = WorkerState::Idle;
        info!("connection handle reset, worker disarmed");
    }

    /// One sampling tick: flush due telemetry, scan every occupied slot,
    /// mirror the new images.
    fn tick(&mut self) {
        let t_now = now_micros();

        if self.last_flush.elapsed() >= self.stats_interval {
            self.flush_stats(t_now);
            self.last_flush = Instant::now();
        }

        if let Some(last) = self.last_tick_us {
            self.stats.interval.collect((t_now - last).max(0) as u64);
        }

        let occupied: Vec<(u16, &'static ModuleType)> = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter_occupied()
            .collect();

        for (slot, module) in occupied {
            if module.direction != DataDirection::Output || module.output_len == 0 {
                continue;
            }
            self.scan_one(slot, module, t_now);
        }

        let t_after = now_micros();
        self.stats.duration.collect((t_after - t_now).max(0) as u64);
        self.last_tick_us = Some(t_now);
    }

    fn scan_one(&mut self, slot: u16, module: &'static ModuleType, t_now: i64) {
        let out = match self
            .provider
            .output_get(slot, CUSTOM_SUBSLOT, &mut self.image)
        {
            Ok(out) => out,
            Err(e) => {
                // Mirror untouched; the next good read re-detects the change
                trace!(slot, error = %e, "output read failed, slot skipped");
                return;
            }
        };

        let len = (out.len as usize)
            .min(module.output_len as usize)
            .min(MAX_OUTPUT_LEN);
        if len == 0 {
            return;
        }

        // The provider's own updated flag is unreliable; compare bytes.
        let Self {
            mirror,
            image,
            egress,
            ..
        } = self;
        let mirrored = &mirror.image(slot)[..len];
        let fresh = &image[..len];
        if mirrored == fresh {
            return;
        }

        scan_slot(slot, module, mirrored, fresh, t_now, &mut |change| {
            egress.enqueue(&change);
        });
        mirror.update(slot, fresh);
    }

    /// Emit the four derived measurements per accumulator, then reset
    /// each window.
    fn flush_stats(&mut self, timestamp_us: i64) {
        let stats = Arc::clone(&self.stats);
        for (name, acc) in stats.accumulators() {
            let snap = acc.flush();
            if let Some(avg) = snap.avg() {
                self.egress.enqueue_raw(
                    &format!("stats_{name}_avg"),
                    &avg.to_string(),
                    timestamp_us,
                );
            }
            self.egress.enqueue_raw(
                &format!("stats_{name}_count"),
                &snap.count.to_string(),
                timestamp_us,
            );
            self.egress.enqueue_raw(
                &format!("stats_{name}_max"),
                &snap.max.to_string(),
                timestamp_us,
            );
            self.egress.enqueue_raw(
                &format!("stats_{name}_alltimemax"),
                &snap.all_time_max.to_string(),
                timestamp_us,
            );
        }
        debug!(timestamp_us, "statistics flushed");
    }
}
