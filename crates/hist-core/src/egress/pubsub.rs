//! Synchronous topic pub/sub sink.
//!
//! One PUB socket bound on TCP; every event goes out as a two-frame
//! multipart message: topic, then a JSON body carrying the measurement,
//! timestamp, value and the fixed tag block. Subscribers filter on the
//! topic prefix. No buffering beyond the transport's high-water mark and
//! no delivery guarantee.

use super::TagBlock;
use crate::detect::Change;
use bytes::Bytes;
use hist_common::error::{BridgeError, BridgeResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

#[derive(Serialize)]
struct PointBody<'a> {
    #[serde(rename = "Measurement")]
    measurement: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: i64,
    value: &'a str,
    #[serde(rename = "ControllerName")]
    controller_name: &'a str,
    #[serde(rename = "Global1")]
    global1: &'static str,
    #[serde(rename = "Global2")]
    global2: &'static str,
    #[serde(rename = "LineMode")]
    line_mode: &'static str,
    #[serde(rename = "LineName")]
    line_name: &'a str,
    #[serde(rename = "ProgramName")]
    program_name: &'a str,
    #[serde(rename = "TimeShift1")]
    time_shift1: &'static str,
    #[serde(rename = "TimeShift2")]
    time_shift2: &'static str,
    #[serde(rename = "UserFilter1")]
    user_filter1: &'static str,
    #[serde(rename = "UserFilter2")]
    user_filter2: &'static str,
}

/// Topic for one change: `<prefix><kind>.<slot>.<element>`.
pub(crate) fn change_topic(tags: &TagBlock, change: &Change) -> String {
    format!(
        "{}{}.{}.{}",
        tags.prefix(),
        change.kind.tag(),
        change.slot,
        change.element
    )
}

/// Measurement name for one change: `<prefix><kind>_<slot>_<element>`.
pub(crate) fn change_measurement(tags: &TagBlock, change: &Change) -> String {
    format!(
        "{}{}_{}_{}",
        tags.prefix(),
        change.kind.tag(),
        change.slot,
        change.element
    )
}

/// Render the JSON body frame.
pub(crate) fn encode_body(
    tags: &TagBlock,
    measurement: &str,
    value: &str,
    timestamp_us: i64,
) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&PointBody {
        measurement,
        timestamp: timestamp_us,
        value,
        controller_name: tags.controller_name(),
        global1: "0",
        global2: "0",
        line_mode: "0",
        line_name: tags.line_name(),
        program_name: tags.program_name(),
        time_shift1: "0",
        time_shift2: "0",
        user_filter1: "Reserved1",
        user_filter2: "Reserved2",
    })
}

/// The PUB sink. Owned by the sampler thread.
pub struct PubSubSink {
    runtime: tokio::runtime::Runtime,
    socket: PubSocket,
    tags: Arc<TagBlock>,
    send_failures: u64,
}

impl PubSubSink {
    /// Bind the PUB socket on `tcp://0.0.0.0:<port>`.
    ///
    /// # Errors
    ///
    /// Fails when the port cannot be bound.
    pub fn bind(port: u16, tags: Arc<TagBlock>) -> BridgeResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Egress(format!("pub/sub runtime: {e}")))?;
        let mut socket = PubSocket::new();
        let endpoint = format!("tcp://0.0.0.0:{port}");
        runtime
            .block_on(socket.bind(&endpoint))
            .map_err(|e| BridgeError::Egress(format!("cannot bind {endpoint}: {e}")))?;
        info!(endpoint, "pub/sub sink bound");
        Ok(Self {
            runtime,
            socket,
            tags,
            send_failures: 0,
        })
    }

    /// Publish one change as topic + JSON frames.
    pub fn publish_change(&mut self, change: &Change) {
        let topic = change_topic(&self.tags, change);
        let measurement = change_measurement(&self.tags, change);
        self.publish(topic, &measurement, &change.text, change.timestamp_us);
    }

    /// Publish one raw measurement (self-telemetry).
    pub fn publish_raw(&mut self, name: &str, value: &str, timestamp_us: i64) {
        let topic = format!("{}{}", self.tags.prefix(), name);
        let measurement = topic.clone();
        self.publish(topic, &measurement, value, timestamp_us);
    }

    fn publish(&mut self, topic: String, measurement: &str, value: &str, timestamp_us: i64) {
        let body = match encode_body(&self.tags, measurement, value, timestamp_us) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, measurement, "pub/sub body encoding failed");
                return;
            }
        };
        let mut message = ZmqMessage::from(topic);
        message.push_back(Bytes::from(body));
        if let Err(e) = self.runtime.block_on(self.socket.send(message)) {
            // Fire-and-forget; count it and move on
            self.send_failures += 1;
            debug!(error = %e, failures = self.send_failures, "pub/sub send failed");
        }
    }

    /// Number of failed sends since startup.
    #[must_use]
    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hist_common::config::BridgeConfig;
    use hist_common::value::VariableKind;

    fn tags() -> Arc<TagBlock> {
        let config = BridgeConfig {
            prefix: "pg_".to_owned(),
            ..BridgeConfig::default()
        };
        Arc::new(TagBlock::new(&config))
    }

    fn change() -> Change {
        Change {
            slot: 1,
            element: 3,
            kind: VariableKind::U16,
            text: "4".to_owned(),
            timestamp_us: 42,
        }
    }

    #[test]
    fn test_topic_format() {
        assert_eq!(change_topic(&tags(), &change()), "pg_u16.1.3");
    }

    #[test]
    fn test_measurement_format() {
        assert_eq!(change_measurement(&tags(), &change()), "pg_u16_1_3");
    }

    #[test]
    fn test_body_fields() {
        let tags = tags();
        let body = encode_body(&tags, "pg_u16_1_3", "4", 42).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["Measurement"], "pg_u16_1_3");
        assert_eq!(json["Timestamp"], 42);
        assert_eq!(json["value"], "4");
        assert_eq!(json["ControllerName"], "PLC1");
        assert_eq!(json["LineName"], "Line1");
        assert_eq!(json["ProgramName"], "Program1");
        assert_eq!(json["UserFilter1"], "Reserved1");
        assert_eq!(json["Global1"], "0");
    }

    #[test]
    fn test_bind_and_publish_without_subscribers() {
        // PUB sockets drop messages when nobody subscribed; publishing
        // must neither block nor error out.
        let mut sink = PubSubSink::bind(0, tags()).unwrap();
        sink.publish_change(&change());
        sink.publish_raw("stats_interval_count", "3", 100);
        assert_eq!(sink.send_failures(), 0);
    }
}
