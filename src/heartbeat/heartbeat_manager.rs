use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::HEARTBEAT_FAILURES;
use crate::HeartbeatConfig;
use crate::StoreClient;

/// Keeps registered instances healthy in the store
///
/// Every `interval` each tracked instance id is acknowledged through
/// [`StoreClient::acknowledge_health`]. A global switch gates the sweep:
/// while closed, ids stay tracked but nothing is acknowledged, so their
/// store-side health lapses on its own TTL.
pub struct HeartbeatManager<S: StoreClient> {
    store: Arc<S>,
    instance_ids: DashSet<String>,
    open: AtomicBool,
    switch_changed: Notify,
    interval: Duration,
}

impl<S: StoreClient> HeartbeatManager<S> {
    pub fn new(
        store: Arc<S>,
        config: &HeartbeatConfig,
    ) -> Self {
        Self {
            store,
            instance_ids: DashSet::new(),
            open: AtomicBool::new(config.open_on_start),
            switch_changed: Notify::new(),
            interval: config.interval(),
        }
    }

    pub fn add_instance_id(
        &self,
        id: impl Into<String>,
    ) {
        let id = id.into();
        trace!(instance_id = %id, "track heartbeat");
        self.instance_ids.insert(id);
    }

    /// Returns false if the id was not tracked
    pub fn remove_instance_id(
        &self,
        id: &str,
    ) -> bool {
        self.instance_ids.remove(id).is_some()
    }

    pub fn is_tracked(
        &self,
        id: &str,
    ) -> bool {
        self.instance_ids.contains(id)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instance_ids.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Opens or closes the global heartbeat switch
    ///
    /// A change wakes the sweep loop so that reopening acknowledges at once.
    pub fn set_open(
        &self,
        open: bool,
    ) {
        let previous = self.open.swap(open, Ordering::AcqRel);
        if previous != open {
            info!(open, "heartbeat switch changed");
            self.switch_changed.notify_one();
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Acknowledges every tracked id once; returns how many succeeded
    ///
    /// A failed acknowledgment is logged and neither removes the id nor
    /// stops the sweep.
    pub async fn sweep(&self) -> usize {
        if !self.is_open() {
            trace!("heartbeat switch closed, skip sweep");
            return 0;
        }

        // Snapshot first: no shard guard may live across an await
        let ids: Vec<String> = self.instance_ids.iter().map(|id| id.key().clone()).collect();
        let mut acknowledged = 0;
        for id in ids {
            match self.store.acknowledge_health(&id).await {
                Ok(()) => acknowledged += 1,
                Err(e) => {
                    HEARTBEAT_FAILURES.inc();
                    warn!(instance_id = %id, error = %e, "heartbeat acknowledgment failed");
                }
            }
        }
        debug!(acknowledged, "heartbeat sweep finished");
        acknowledged
    }

    /// Runs the periodic sweep until `shutdown` fires
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis() as u64, "start heartbeat loop");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("heartbeat loop received shutdown signal");
                    return;
                }
                _ = interval.tick() => {}
                _ = self.switch_changed.notified() => {
                    debug!("heartbeat switch woke the loop");
                }
            }
            self.sweep().await;
        }
    }
}
