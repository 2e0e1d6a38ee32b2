use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_ERROR_BACKOFF_MS;
use crate::constants::DEFAULT_LOOKUP_INTERVAL_MS;
use crate::Error;
use crate::Result;

/// Timing of the per-group poll loops
///
/// ```toml
/// [lookup]
/// interval_ms = 30000
/// error_backoff_ms = 2000
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LookupConfig {
    /// Sleep between two polls of the same group
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Pause after a failed poll before the loop resumes
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl LookupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::InvalidConfig("lookup.interval_ms must be greater than 0".into()));
        }
        if self.error_backoff_ms == 0 {
            return Err(Error::InvalidConfig(
                "lookup.error_backoff_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_LOOKUP_INTERVAL_MS
}
fn default_error_backoff_ms() -> u64 {
    DEFAULT_ERROR_BACKOFF_MS
}
