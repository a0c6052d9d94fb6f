//! Configuration structures for the bridge.
//!
//! Supports TOML deserialization with defaults matching the shipped
//! device identity; the daemon's command line overrides individual
//! fields on top.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest UDP payload a batch buffer may ever hold.
pub const MAX_BATCH_BYTES: usize = 65535;

/// Ethernet + UDP framing subtracted from the MTU when sizing datagrams.
const FRAMING_OVERHEAD: u32 = 14 + 8;

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Ethernet interface the fieldbus stack binds to.
    pub interface: String,

    /// Station name announced on the fieldbus.
    pub station_name: String,

    /// Line name tag embedded in every measurement.
    pub line_name: String,

    /// Controller name tag embedded in every measurement.
    pub controller_name: String,

    /// Program name tag embedded in every measurement.
    pub program_name: String,

    /// Prefix prepended to every measurement name and topic.
    pub prefix: String,

    /// Sampling tick period. Must be at least the fieldbus stack's
    /// minimum tick; zero disables the internal timer (external ticks).
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Spacing between self-telemetry flushes.
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,

    /// Fieldbus provider selection.
    pub fieldbus: FieldbusConfig,

    /// Line-protocol UDP sink.
    pub influx: InfluxConfig,

    /// Topic pub/sub sink.
    pub zmq: ZmqConfig,

    /// Worker thread scheduling.
    pub realtime: RealtimeConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interface: String::from("eth0"),
            station_name: String::from("historianio"),
            line_name: String::from("Line1"),
            controller_name: String::from("PLC1"),
            program_name: String::from("Program1"),
            prefix: String::new(),
            tick_interval: Duration::from_micros(250),
            stats_interval: Duration::from_secs(10),
            fieldbus: FieldbusConfig::default(),
            influx: InfluxConfig::default(),
            zmq: ZmqConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

/// Which process-image provider backs the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Real PROFINET device stack (linked externally).
    #[default]
    Profinet,
    /// In-memory provider for tests and controller-less runs.
    Simulated,
}

/// Fieldbus provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FieldbusConfig {
    /// Provider backing the process image.
    pub provider: ProviderKind,
}

/// Line-protocol UDP sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Ingest host.
    pub host: String,

    /// Ingest UDP port; 0 disables the sink.
    pub port: u16,

    /// MTU of the path to the sink. The sink is expected colocated, so
    /// this defaults to the Linux loopback MTU.
    pub loopback_mtu: u32,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 8089,
            loopback_mtu: 65536,
        }
    }
}

impl InfluxConfig {
    /// Largest datagram the sink may send: MTU minus Ethernet+UDP framing,
    /// clamped to the batch buffer capacity.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        (self.loopback_mtu.saturating_sub(FRAMING_OVERHEAD) as usize).min(MAX_BATCH_BYTES)
    }
}

/// Topic pub/sub sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZmqConfig {
    /// TCP port the PUB socket binds; 0 disables the sink.
    pub port: u16,
}

impl Default for ZmqConfig {
    fn default() -> Self {
        Self { port: 5555 }
    }
}

/// Worker thread scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Attempt SCHED_FIFO elevation (requires privileges; degrades to a
    /// warning without them).
    pub enabled: bool,

    /// Sampler thread priority.
    pub sampler_priority: u8,

    /// Submitter thread priority; runs above the sampler so batches
    /// drain ahead of new production.
    pub submitter_priority: u8,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sampler_priority: 15,
            submitter_priority: 16,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
