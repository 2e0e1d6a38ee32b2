use std::sync::Arc;

use dashmap::DashMap;
use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::RegistryInner;
use crate::metrics::POLL_FAILURES;
use crate::StoreClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollKind {
    Service,
    Command,
}

impl PollKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            PollKind::Service => "service",
            PollKind::Command => "command",
        }
    }
}

/// Last applied store index per group
///
/// Each cursor sits behind its own lock. Whoever applies a snapshot holds
/// that lock from the staleness check until the cache update is done, so
/// the cursor only moves forward and an older response can never be
/// applied after a newer one.
#[derive(Debug, Default)]
pub(crate) struct PollCursors {
    cursors: DashMap<String, Arc<Mutex<u64>>>,
}

impl PollCursors {
    pub(crate) fn cursor(
        &self,
        group: &str,
    ) -> Arc<Mutex<u64>> {
        self.cursors.entry(group.to_string()).or_default().clone()
    }

    pub(crate) fn current(
        &self,
        group: &str,
    ) -> u64 {
        self.cursors.get(group).map(|cursor| *cursor.value().lock()).unwrap_or(0)
    }
}

/// Groups that own a running poller of one kind
///
/// A claim is a single atomic insert and is never released.
#[derive(Debug, Default)]
pub(crate) struct ActiveGroups {
    groups: DashSet<String>,
}

impl ActiveGroups {
    /// True for exactly one caller per group
    pub(crate) fn claim(
        &self,
        group: &str,
    ) -> bool {
        self.groups.insert(group.to_string())
    }

    pub(crate) fn contains(
        &self,
        group: &str,
    ) -> bool {
        self.groups.contains(group)
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }
}

/// Poll loop of one group until `shutdown` fires
///
/// Each cycle sleeps the lookup interval, then polls once. A failed cycle
/// is logged and followed by the error backoff; the loop itself never exits
/// on error.
pub(crate) async fn run_poller<S: StoreClient>(
    inner: Arc<RegistryInner<S>>,
    kind: PollKind,
    group: String,
    mut shutdown: watch::Receiver<()>,
) {
    let interval = inner.config.lookup.interval();
    let backoff = inner.config.lookup.error_backoff();
    info!(kind = kind.as_str(), %group, "start poller");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(interval) => {}
        }

        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = inner.poll_once(kind, &group) => result,
        };

        match result {
            Ok(notified) => {
                debug!(kind = kind.as_str(), %group, notified, "poll cycle finished");
            }
            Err(e) => {
                POLL_FAILURES.with_label_values(&[kind.as_str(), group.as_str()]).inc();
                error!(
                    kind = kind.as_str(),
                    %group,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "poll failed, backing off"
                );
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = sleep(backoff) => {}
                }
            }
        }
    }

    info!(kind = kind.as_str(), %group, "poller stopped");
}
