//! Common harness for pipeline acceptance tests.
//!
//! Assembles a full bridge against the simulated provider, with the
//! line-protocol sink pointed at a capturing UDP socket and the internal
//! timer disabled so the tests pace the ticks themselves.

#![allow(dead_code)] // Not every helper is used by every test module

use hist_common::config::{BridgeConfig, InfluxConfig, ZmqConfig};
use hist_core::bridge::{Bridge, RunningBridge};
use hist_fieldbus::catalog::{CUSTOM_SUBMODULE_IDENT, CUSTOM_SUBSLOT};
use hist_fieldbus::device::DeviceEvent;
use hist_fieldbus::SimulatedProvider;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read timeout for one expected datagram.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);
/// Shorter window used to assert silence.
const SILENCE_WINDOW: Duration = Duration::from_millis(250);

/// A running bridge plus the observation points of one test.
pub struct Pipeline {
    pub provider: Arc<SimulatedProvider>,
    pub running: RunningBridge,
    receiver: UdpSocket,
}

/// Build and start a pipeline.
///
/// `max_packet` sizes the line-protocol batches (the MTU is derived from
/// it); `stats_interval` paces the telemetry flush.
pub fn pipeline(max_packet: u32, stats_interval: Duration) -> Pipeline {
    let receiver = UdpSocket::bind("127.0.0.1:0").expect("capture socket");
    receiver
        .set_read_timeout(Some(RECV_TIMEOUT))
        .expect("socket timeout");
    let port = receiver.local_addr().expect("local addr").port();

    let config = BridgeConfig {
        tick_interval: Duration::ZERO, // ticks are posted by the test
        stats_interval,
        influx: InfluxConfig {
            host: "127.0.0.1".to_owned(),
            port,
            loopback_mtu: max_packet + 14 + 8,
        },
        zmq: ZmqConfig { port: 0 },
        ..BridgeConfig::default()
    };

    let provider = Arc::new(SimulatedProvider::new());
    let running = Bridge::new(&config, Arc::clone(&provider) as _)
        .expect("bridge construction")
        .start()
        .expect("bridge start");

    Pipeline {
        provider,
        running,
        receiver,
    }
}

impl Pipeline {
    /// Plug a catalog module (and its submodule) into a slot.
    pub fn plug(&self, slot: u16, module_ident: u32) {
        let device = self.running.device();
        device
            .exp_module_ind(self.provider.as_ref(), slot, module_ident)
            .expect("module plug");
        device
            .exp_submodule_ind(
                self.provider.as_ref(),
                slot,
                CUSTOM_SUBSLOT,
                module_ident,
                CUSTOM_SUBMODULE_IDENT,
            )
            .expect("submodule plug");
    }

    /// Finish parameterization and wait until the sampler armed itself.
    pub fn connect(&self, arep: u32) {
        self.running
            .device()
            .state_ind(self.provider.as_ref(), arep, DeviceEvent::PrmEnd);
        self.wait_for(|| self.provider.application_ready_calls() >= 1, "arming");
    }

    /// Post one tick and wait until the sampler has processed it.
    pub fn tick(&self) {
        let before = self.provider.periodic_calls();
        self.running.tick();
        self.wait_for(
            || self.provider.periodic_calls() > before,
            "tick processing",
        );
    }

    fn wait_for(&self, mut done: impl FnMut() -> bool, what: &str) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Receive one datagram and split it into records.
    pub fn recv_records(&self) -> Vec<Record> {
        let mut buf = [0u8; 65536];
        let n = self.receiver.recv(&mut buf).expect("expected a datagram");
        let text = std::str::from_utf8(&buf[..n]).expect("utf-8 records");
        text.lines().map(Record::parse).collect()
    }

    /// Receive records until the socket goes silent.
    pub fn recv_until_silence(&self) -> Vec<Record> {
        let mut all = Vec::new();
        self.receiver
            .set_read_timeout(Some(SILENCE_WINDOW))
            .expect("socket timeout");
        let mut buf = [0u8; 65536];
        while let Ok(n) = self.receiver.recv(&mut buf) {
            let text = std::str::from_utf8(&buf[..n]).expect("utf-8 records");
            all.extend(text.lines().map(Record::parse));
        }
        self.receiver
            .set_read_timeout(Some(RECV_TIMEOUT))
            .expect("socket timeout");
        all
    }

    /// Assert that no datagram arrives within the silence window.
    pub fn expect_silence(&self) {
        self.receiver
            .set_read_timeout(Some(SILENCE_WINDOW))
            .expect("socket timeout");
        let mut buf = [0u8; 65536];
        let got = self.receiver.recv(&mut buf);
        self.receiver
            .set_read_timeout(Some(RECV_TIMEOUT))
            .expect("socket timeout");
        assert!(
            got.is_err(),
            "expected silence, received: {:?}",
            std::str::from_utf8(&buf[..got.unwrap()])
        );
    }

    /// Tear the bridge down.
    pub fn shutdown(self) {
        self.running.shutdown();
    }
}

/// One parsed line-protocol record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub measurement: String,
    pub value: String,
    pub timestamp_us: i64,
}

impl Record {
    /// Parse `measurement,tags value=V TS`.
    pub fn parse(line: &str) -> Self {
        let measurement = line.split(',').next().expect("measurement").to_owned();
        let (_, tail) = line.split_once(" value=").expect("value field");
        let (value, ts) = tail.split_once(' ').expect("timestamp");
        Self {
            measurement,
            value: value.to_owned(),
            timestamp_us: ts.parse().expect("numeric timestamp"),
        }
    }
}
