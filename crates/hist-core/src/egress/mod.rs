//! Dual-sink egress.
//!
//! Every change and every raw measurement fans out to both enabled sinks:
//! the batched line-protocol UDP sink and the synchronous pub/sub sink.
//! Either sink may be absent (disabled by a zero port at startup).
//!
//! Per-sink encode latency of data changes feeds the `influx_enqueue` and
//! `zmq_enqueue` accumulators. Self-telemetry emissions are deliberately
//! not self-measured, keeping back-to-back flushes idempotent.

pub mod line;
pub mod pubsub;

pub use line::{BatchRing, LineSink, Pop, Submitter, RING_BUFFERS};
pub use pubsub::PubSubSink;

use crate::detect::Change;
use hist_common::config::BridgeConfig;
use hist_common::stats::BridgeStats;
use std::sync::Arc;
use std::time::Instant;

/// Tag values shared by every emitted measurement, precomputed at startup.
#[derive(Debug)]
pub struct TagBlock {
    prefix: String,
    controller_name: String,
    line_name: String,
    program_name: String,
    fixed: String,
}

impl TagBlock {
    /// Build the block from the process configuration.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        let fixed = format!(
            "ControllerName={controller},Global1=0,Global2=0,LineMode=0,LineName={line},\
             ProgramName={program},TimeShift1=0,TimeShift2=0,UserFilter1=Reserved1,UserFilter2=Reserved2",
            controller = config.controller_name,
            line = config.line_name,
            program = config.program_name,
        );
        Self {
            prefix: config.prefix.clone(),
            controller_name: config.controller_name.clone(),
            line_name: config.line_name.clone(),
            program_name: config.program_name.clone(),
            fixed,
        }
    }

    /// Measurement name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn controller_name(&self) -> &str {
        &self.controller_name
    }

    pub(crate) fn line_name(&self) -> &str {
        &self.line_name
    }

    pub(crate) fn program_name(&self) -> &str {
        &self.program_name
    }

    pub(crate) fn fixed(&self) -> &str {
        &self.fixed
    }
}

/// Fan-out front of the two sinks. Owned by the sampler thread.
pub struct Egress {
    line: Option<LineSink>,
    pubsub: Option<PubSubSink>,
    stats: Arc<BridgeStats>,
}

impl Egress {
    /// Assemble the fan-out from the enabled sinks.
    #[must_use]
    pub fn new(line: Option<LineSink>, pubsub: Option<PubSubSink>, stats: Arc<BridgeStats>) -> Self {
        Self {
            line,
            pubsub,
            stats,
        }
    }

    /// Deliver one detected change to every enabled sink.
    pub fn enqueue(&mut self, change: &Change) {
        if let Some(line) = self.line.as_mut() {
            let started = Instant::now();
            line.append_change(change);
            self.stats
                .influx_enqueue
                .collect(started.elapsed().as_micros() as u64);
        }
        if let Some(pubsub) = self.pubsub.as_mut() {
            let started = Instant::now();
            pubsub.publish_change(change);
            self.stats
                .zmq_enqueue
                .collect(started.elapsed().as_micros() as u64);
        }
    }

    /// Deliver a raw measurement (self-telemetry) to every enabled sink.
    pub fn enqueue_raw(&mut self, name: &str, value: &str, timestamp_us: i64) {
        if let Some(line) = self.line.as_mut() {
            line.append_raw(name, value, timestamp_us);
        }
        if let Some(pubsub) = self.pubsub.as_mut() {
            pubsub.publish_raw(name, value, timestamp_us);
        }
    }

    /// The line sink, when enabled.
    #[must_use]
    pub fn line_sink(&self) -> Option<&LineSink> {
        self.line.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hist_common::event::EventSet;
    use hist_common::value::VariableKind;

    fn tags() -> Arc<TagBlock> {
        Arc::new(TagBlock::new(&BridgeConfig::default()))
    }

    #[test]
    fn test_fixed_block_rendering() {
        let tags = tags();
        assert_eq!(
            tags.fixed(),
            "ControllerName=PLC1,Global1=0,Global2=0,LineMode=0,LineName=Line1,\
             ProgramName=Program1,TimeShift1=0,TimeShift2=0,UserFilter1=Reserved1,UserFilter2=Reserved2"
        );
    }

    #[test]
    fn test_change_enqueue_collects_latency() {
        let stats = Arc::new(BridgeStats::new());
        let ring = Arc::new(BatchRing::new(1024));
        let sink = LineSink::new(
            Arc::clone(&ring),
            Arc::new(EventSet::new()),
            tags(),
        );
        let mut egress = Egress::new(Some(sink), None, Arc::clone(&stats));

        egress.enqueue(&Change {
            slot: 1,
            element: 0,
            kind: VariableKind::U16,
            text: "7".to_owned(),
            timestamp_us: 1,
        });

        assert_eq!(stats.influx_enqueue.snapshot().count, 1);
        assert_eq!(stats.zmq_enqueue.snapshot().count, 0);
    }

    #[test]
    fn test_raw_enqueue_is_not_self_measured() {
        let stats = Arc::new(BridgeStats::new());
        let ring = Arc::new(BatchRing::new(1024));
        let sink = LineSink::new(
            Arc::clone(&ring),
            Arc::new(EventSet::new()),
            tags(),
        );
        let mut egress = Egress::new(Some(sink), None, Arc::clone(&stats));

        egress.enqueue_raw("stats_interval_count", "0", 1);

        assert_eq!(stats.influx_enqueue.snapshot().count, 0);
        assert!(ring.active_fill() > 0);
    }

    #[test]
    fn test_disabled_sinks_are_noops() {
        let stats = Arc::new(BridgeStats::new());
        let mut egress = Egress::new(None, None, stats);
        egress.enqueue(&Change {
            slot: 0,
            element: 0,
            kind: VariableKind::Bool,
            text: "1".to_owned(),
            timestamp_us: 0,
        });
        egress.enqueue_raw("stats_duration_max", "5", 0);
    }
}
