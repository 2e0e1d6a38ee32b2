use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_HEARTBEAT_INTERVAL_MS;
use crate::constants::DEFAULT_SERVICE_TTL_SECS;
use crate::Error;
use crate::Result;

/// Health acknowledgment loop for registered instances
///
/// # Usage
///
/// ```toml
/// [heartbeat]
/// interval_ms = 3000
/// service_ttl_secs = 30
/// open_on_start = false
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeartbeatConfig {
    /// Period of the acknowledgment sweep
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// TTL attached to every registered instance; the store marks an
    /// instance critical once this elapses without an acknowledgment
    #[serde(default = "default_service_ttl_secs")]
    pub service_ttl_secs: u64,

    /// Whether the sweep acknowledges before `set_available(None)` is called
    #[serde(default)]
    pub open_on_start: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            service_ttl_secs: default_service_ttl_secs(),
            open_on_start: false,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::InvalidConfig("heartbeat.interval_ms must be greater than 0".into()));
        }
        if self.service_ttl_secs == 0 {
            return Err(Error::InvalidConfig(
                "heartbeat.service_ttl_secs must be greater than 0".into(),
            ));
        }
        // A sweep slower than the TTL lets every instance lapse between acknowledgments
        if self.interval_ms >= self.service_ttl_secs * 1000 {
            return Err(Error::InvalidConfig(format!(
                "heartbeat.interval_ms ({}) must be shorter than service_ttl_secs ({}s)",
                self.interval_ms, self.service_ttl_secs
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn service_ttl(&self) -> Duration {
        Duration::from_secs(self.service_ttl_secs)
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
fn default_service_ttl_secs() -> u64 {
    DEFAULT_SERVICE_TTL_SECS
}
