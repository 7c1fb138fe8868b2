use serde::Deserialize;
use std::time::Duration;

use crate::framer::DEFAULT_MAX_LINE_BYTES;
use crate::health::HealthPolicy;

/// Link configuration. Every field has a default matching the ground
/// station's stock LoRa setup, so an empty config file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub serial: SerialConfig,
    pub health: HealthConfig,
    pub command: CommandConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Radio device path
    pub dev: String,
    pub baud: u32,
    /// Upper bound on one read; also how quickly the receive loop sees a stop.
    pub read_timeout_ms: u64,
    /// Pause after opening the port and clearing its buffers.
    pub settle_ms: u64,
    /// Ceiling for an unterminated line before the oldest bytes are dropped.
    pub max_line_bytes: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            dev: "/dev/lora_ground".into(),
            baud: 9600,
            read_timeout_ms: 200,
            settle_ms: 200,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Idle time after which a poll counts as a miss. Keep it well above the
    /// drone's heartbeat period.
    pub timeout_s: f64,
    pub poll_ms: u64,
    /// Consecutive misses before the link is declared down.
    pub grace: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { timeout_s: 30.0, poll_ms: 500, grace: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Extra sends after the first one.
    pub retries: u32,
    /// How long each attempt waits for the matching ack.
    pub ack_wait_s: f64,
    pub ack_poll_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { retries: 0, ack_wait_s: 30.0, ack_poll_ms: 50 }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl HealthConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy { timeout: secs_f64(self.timeout_s), grace: self.grace }
    }
}

impl CommandConfig {
    pub fn ack_wait(&self) -> Duration {
        secs_f64(self.ack_wait_s)
    }

    pub fn ack_poll(&self) -> Duration {
        Duration::from_millis(self.ack_poll_ms.max(1))
    }
}

fn secs_f64(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}
