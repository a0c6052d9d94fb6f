//! The owning bridge value.
//!
//! Constructs registry, mirror, egress and statistics as owned children
//! and hands references into the sampler and submitter threads. The
//! fieldbus stack gets a [`DeviceHandler`] for its callbacks; everything
//! else stays internal.

use crate::egress::{BatchRing, Egress, LineSink, PubSubSink, Submitter, TagBlock};
use crate::realtime;
use crate::sampler::Sampler;
use crate::ticker::Ticker;
use hist_common::config::{BridgeConfig, RealtimeConfig};
use hist_common::error::{BridgeError, BridgeResult};
use hist_common::event::{EventSet, EVENT_SHUTDOWN, EVENT_TIMER};
use hist_common::stats::BridgeStats;
use hist_fieldbus::device::{ConnectionHandle, DeviceHandler};
use hist_fieldbus::registry::SlotRegistry;
use hist_fieldbus::ProcessImageProvider;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Fully wired but not yet running bridge.
pub struct Bridge {
    device: DeviceHandler,
    events: Arc<EventSet>,
    submit_events: Arc<EventSet>,
    sampler: Sampler,
    submitter: Option<Submitter>,
    tick_interval: Duration,
    realtime: RealtimeConfig,
}

impl Bridge {
    /// Construct all components from the configuration.
    ///
    /// # Errors
    ///
    /// Fails when a sink cannot be set up (unreachable UDP target,
    /// pub/sub port in use).
    pub fn new(
        config: &BridgeConfig,
        provider: Arc<dyn ProcessImageProvider>,
    ) -> BridgeResult<Self> {
        let registry = Arc::new(Mutex::new(SlotRegistry::new()));
        let events = Arc::new(EventSet::new());
        let submit_events = Arc::new(EventSet::new());
        let connection = Arc::new(ConnectionHandle::new());
        let stats = Arc::new(BridgeStats::new());
        let tags = Arc::new(TagBlock::new(config));

        let device = DeviceHandler::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            Arc::clone(&connection),
        );

        let (line, submitter) = if config.influx.port != 0 {
            let ring = Arc::new(BatchRing::new(config.influx.max_packet_size()));
            let sink = LineSink::new(
                Arc::clone(&ring),
                Arc::clone(&submit_events),
                Arc::clone(&tags),
            );
            let submitter = Submitter::new(
                ring,
                Arc::clone(&submit_events),
                Arc::clone(&stats),
                &config.influx.host,
                config.influx.port,
            )?;
            info!(
                host = %config.influx.host,
                port = config.influx.port,
                max_packet = config.influx.max_packet_size(),
                "line-protocol sink enabled"
            );
            (Some(sink), Some(submitter))
        } else {
            info!("line-protocol sink disabled");
            (None, None)
        };

        let pubsub = if config.zmq.port != 0 {
            Some(PubSubSink::bind(config.zmq.port, Arc::clone(&tags))?)
        } else {
            info!("pub/sub sink disabled");
            None
        };

        let egress = Egress::new(line, pubsub, Arc::clone(&stats));
        let sampler = Sampler::new(
            provider,
            registry,
            connection,
            Arc::clone(&events),
            egress,
            stats,
            config.stats_interval,
        );

        Ok(Self {
            device,
            events,
            submit_events,
            sampler,
            submitter,
            tick_interval: config.tick_interval,
            realtime: config.realtime.clone(),
        })
    }

    /// The callback handler to register with the fieldbus stack.
    #[must_use]
    pub fn device(&self) -> &DeviceHandler {
        &self.device
    }

    /// Spawn the worker threads and the ticker.
    ///
    /// # Errors
    ///
    /// Fails when a thread cannot be spawned.
    pub fn start(self) -> BridgeResult<RunningBridge> {
        let Self {
            device,
            events,
            submit_events,
            sampler,
            submitter,
            tick_interval,
            realtime,
        } = self;

        let submitter_thread = match submitter {
            Some(submitter) => {
                let rt = realtime.clone();
                Some(
                    std::thread::Builder::new()
                        .name("hist-submitter".into())
                        .spawn(move || {
                            if rt.enabled {
                                if let Err(e) =
                                    realtime::elevate_current_thread(rt.submitter_priority)
                                {
                                    warn!(error = %e, "submitter priority not applied");
                                }
                            }
                            submitter.run();
                        })
                        .map_err(|e| BridgeError::Io(e.to_string()))?,
                )
            }
            None => None,
        };

        let sampler_thread = {
            let rt = realtime.clone();
            std::thread::Builder::new()
                .name("hist-sampler".into())
                .spawn(move || {
                    if rt.enabled {
                        if let Err(e) = realtime::elevate_current_thread(rt.sampler_priority) {
                            warn!(error = %e, "sampler priority not applied");
                        }
                    }
                    sampler.run();
                })
                .map_err(|e| BridgeError::Io(e.to_string()))?
        };

        let ticker = if tick_interval > Duration::ZERO {
            Some(
                Ticker::start(Arc::clone(&events), tick_interval)
                    .map_err(|e| BridgeError::Io(e.to_string()))?,
            )
        } else {
            info!("internal timer disabled, expecting external ticks");
            None
        };

        Ok(RunningBridge {
            device,
            events,
            submit_events,
            ticker,
            sampler_thread: Some(sampler_thread),
            submitter_thread,
        })
    }
}

/// A started bridge: worker threads plus the device callback handler.
pub struct RunningBridge {
    device: DeviceHandler,
    events: Arc<EventSet>,
    submit_events: Arc<EventSet>,
    ticker: Option<Ticker>,
    sampler_thread: Option<JoinHandle<()>>,
    submitter_thread: Option<JoinHandle<()>>,
}

impl RunningBridge {
    /// The callback handler to register with the fieldbus stack.
    #[must_use]
    pub fn device(&self) -> &DeviceHandler {
        &self.device
    }

    /// Post one timer tick. Used when the internal timer is disabled.
    pub fn tick(&self) {
        self.events.post(EVENT_TIMER);
    }

    /// Stop the ticker, drain the workers, and join them.
    pub fn shutdown(mut self) {
        info!("shutting down bridge");
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.events.post(EVENT_SHUTDOWN);
        self.submit_events.post(EVENT_SHUTDOWN);
        if let Some(handle) = self.sampler_thread.take() {
            if handle.join().is_err() {
                warn!("sampler thread panicked");
            }
        }
        if let Some(handle) = self.submitter_thread.take() {
            if handle.join().is_err() {
                warn!("submitter thread panicked");
            }
        }
        info!("bridge stopped");
    }
}
