use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_NOTIFY_KEEP_ALIVE_MS;
use crate::constants::DEFAULT_NOTIFY_MAX_WORKERS;
use crate::constants::DEFAULT_NOTIFY_MIN_WORKERS;
use crate::constants::DEFAULT_NOTIFY_QUEUE_CAPACITY;
use crate::Error;
use crate::Result;

/// Sizing of the notification worker pool
///
/// `min_workers` threads live as long as the pool. Once the pending queue
/// is full, extra workers are started up to `max_workers`; they exit after
/// `keep_alive_ms` without work. A job submitted while the queue is full
/// and all `max_workers` are busy is dropped.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Capacity of the pending-job queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Idle time after which a surge worker exits
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            keep_alive_ms: default_keep_alive_ms(),
        }
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig("notify.max_workers must be at least 1".into()));
        }
        if self.min_workers > self.max_workers {
            return Err(Error::InvalidConfig(format!(
                "notify.min_workers ({}) exceeds notify.max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("notify.queue_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

fn default_min_workers() -> usize {
    DEFAULT_NOTIFY_MIN_WORKERS
}
fn default_max_workers() -> usize {
    DEFAULT_NOTIFY_MAX_WORKERS
}
fn default_queue_capacity() -> usize {
    DEFAULT_NOTIFY_QUEUE_CAPACITY
}
fn default_keep_alive_ms() -> u64 {
    DEFAULT_NOTIFY_KEEP_ALIVE_MS
}
