use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::DashSet;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ActiveGroups;
use super::CommandCache;
use super::GroupAddresses;
use super::PollCursors;
use super::PollKind;
use super::ServiceCache;
use crate::address::instance_id;
use crate::address::service_name;
use crate::metrics::CONVERSION_FAILURES;
use crate::metrics::NOTIFICATIONS_DROPPED;
use crate::registry::run_poller;
use crate::Address;
use crate::ClusterKey;
use crate::CommandListener;
use crate::CommandListenerTable;
use crate::DispatchError;
use crate::Error;
use crate::HeartbeatManager;
use crate::IndexedInstances;
use crate::InstanceDescriptor;
use crate::NotifyDispatcher;
use crate::NotifyJob;
use crate::RegistryConfig;
use crate::Result;
use crate::ServiceListener;
use crate::ServiceListenerTable;
use crate::StoreClient;

/// State shared by the registry facade and its background tasks
pub(crate) struct RegistryInner<S: StoreClient> {
    pub(crate) store: Arc<S>,
    pub(crate) config: RegistryConfig,

    pub(crate) services: ServiceCache,
    pub(crate) commands: CommandCache,
    pub(crate) cursors: PollCursors,

    pub(crate) service_listeners: Arc<ServiceListenerTable>,
    pub(crate) command_listeners: Arc<CommandListenerTable>,
    pub(crate) dispatcher: NotifyDispatcher,
    pub(crate) heartbeat: Arc<HeartbeatManager<S>>,

    /// Clusters whose latest change the dispatcher refused
    pending_services: DashSet<ClusterKey>,
    /// Groups whose latest command the dispatcher refused
    pending_commands: DashSet<String>,

    /// Serializes the first synchronous population of a group
    population_gates: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl<S: StoreClient> RegistryInner<S> {
    /// Runs one poll of `group` and returns how many notifications were queued
    pub(crate) async fn poll_once(
        &self,
        kind: PollKind,
        group: &str,
    ) -> Result<usize> {
        match kind {
            PollKind::Service => {
                let last_index = self.cursors.current(group);
                let view = self
                    .store
                    .fetch_healthy_instances(&service_name(group), last_index)
                    .await?;
                Ok(self.apply_service_snapshot(group, view, true))
            }
            PollKind::Command => {
                let command = self.store.fetch_command(group).await?;
                Ok(usize::from(self.update_command_cache(group, &command, true)))
            }
        }
    }

    /// Applies a fetched view of `group` to the service cache
    ///
    /// A view whose index does not move past the cursor, or that lists no
    /// instance, is ignored. Otherwise the cursor advances to the view's index
    /// and every changed cluster is handed to the dispatcher when `notify`
    /// is set. Clusters whose last change was refused by the dispatcher are
    /// offered again with their cached list on every notifying call, changed
    /// or not. Returns the number of notifications queued.
    pub(crate) fn apply_service_snapshot(
        &self,
        group: &str,
        view: IndexedInstances,
        notify: bool,
    ) -> usize {
        let cursor = self.cursors.cursor(group);
        let mut cursor = cursor.lock();

        if view.index <= *cursor || view.instances.is_empty() {
            trace!(%group, index = view.index, cursor = *cursor, "no service update");
            return if notify { self.redeliver_services(group, &[]) } else { 0 };
        }

        let snapshot = self.group_addresses(group, &view.instances);
        *cursor = view.index;

        let changed = self.services.apply(group, snapshot);
        if !notify {
            return 0;
        }

        let mut queued = 0;
        for (key, addresses) in &changed {
            info!(
                cluster = %key,
                addresses = ?addresses.iter().map(Address::to_uri).collect::<Vec<_>>(),
                "service addresses changed"
            );
            if self.notify_service(key.clone(), addresses.clone()) {
                queued += 1;
            }
        }
        queued + self.redeliver_services(group, &changed)
    }

    /// Offers the cached list of every pending cluster of `group` not in `skip`
    fn redeliver_services(
        &self,
        group: &str,
        skip: &[(ClusterKey, Arc<Vec<Address>>)],
    ) -> usize {
        let pending: Vec<ClusterKey> = self
            .pending_services
            .iter()
            .filter(|key| key.group() == group && !skip.iter().any(|(changed, _)| changed == key.key()))
            .map(|key| key.key().clone())
            .collect();

        let mut queued = 0;
        for key in pending {
            let Some(addresses) = self.services.get(&key) else {
                continue;
            };
            debug!(cluster = %key, "redeliver refused service notification");
            if self.notify_service(key, addresses) {
                queued += 1;
            }
        }
        queued
    }

    /// Submits a service change and tracks whether it still awaits delivery
    fn notify_service(
        &self,
        key: ClusterKey,
        addresses: Arc<Vec<Address>>,
    ) -> bool {
        let submitted = self.enqueue(NotifyJob::Service {
            key: key.clone(),
            addresses,
        });
        if submitted {
            self.pending_services.remove(&key);
        } else {
            self.pending_services.insert(key);
        }
        submitted
    }

    /// Stores `command` for `group`; returns true when it changed
    ///
    /// A changed command is handed to the dispatcher when `notify` is set.
    /// An unchanged one is handed over again if its last submission was
    /// refused.
    pub(crate) fn update_command_cache(
        &self,
        group: &str,
        command: &str,
        notify: bool,
    ) -> bool {
        if !self.commands.apply(group, command) {
            debug!(%group, %command, "command unchanged");
            if notify && self.pending_commands.contains(group) {
                debug!(%group, "redeliver refused command notification");
                self.notify_command(group, command);
            }
            return false;
        }

        info!(%group, %command, "command changed");
        if notify {
            self.notify_command(group, command);
        }
        true
    }

    fn notify_command(
        &self,
        group: &str,
        command: &str,
    ) -> bool {
        let submitted = self.enqueue(NotifyJob::Command {
            group: group.to_string(),
            command: command.to_string(),
        });
        if submitted {
            self.pending_commands.remove(group);
        } else {
            self.pending_commands.insert(group.to_string());
        }
        submitted
    }

    /// Converts descriptors and groups them by cluster, skipping bad ones
    fn group_addresses(
        &self,
        group: &str,
        instances: &[InstanceDescriptor],
    ) -> GroupAddresses {
        let mut snapshot = GroupAddresses::new();
        for descriptor in instances {
            match descriptor.to_address() {
                Ok(address) => snapshot.entry(address.cluster_key()).or_default().push(address),
                Err(e) => {
                    CONVERSION_FAILURES.with_label_values(&[group]).inc();
                    error!(%group, instance_id = %descriptor.id, error = %e, "skip unconvertible instance");
                }
            }
        }
        snapshot
    }

    /// Submits `job`; a refused job is logged and dropped
    fn enqueue(
        &self,
        job: NotifyJob,
    ) -> bool {
        let kind = job.kind();
        match self.dispatcher.submit(job) {
            Ok(()) => true,
            Err(e) => {
                NOTIFICATIONS_DROPPED.with_label_values(&[kind]).inc();
                warn!(kind, error = %e, "notification dropped");
                false
            }
        }
    }

    fn population_gate(
        &self,
        group: &str,
    ) -> Arc<tokio::sync::Mutex<()>> {
        self.population_gates.entry(group.to_string()).or_default().clone()
    }
}

/// Lifecycle of the background tasks; dropping it stops them
struct Lifecycle {
    runtime: Handle,
    shutdown_tx: watch::Sender<()>,
    closed: AtomicBool,
    service_groups: ActiveGroups,
    command_groups: ActiveGroups,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    dispatcher: NotifyDispatcher,
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        // Pollers and the heartbeat loop see the sender go away
        self.dispatcher.signal_shutdown();
    }
}

/// Client-side registry of service addresses and routing commands
///
/// Keeps, per group, a cache of provider addresses and of the published
/// routing command. Subscribing to a group lazily starts one service or
/// command poller for it; pollers refresh the caches from the store and
/// hand changes to the notification dispatcher, which calls listeners on
/// its own threads. Registered instances are kept healthy by the heartbeat
/// loop.
///
/// Must be created inside a tokio runtime. Clones share all state.
pub struct LookupRegistry<S: StoreClient> {
    pub(super) inner: Arc<RegistryInner<S>>,
    lifecycle: Arc<Lifecycle>,
}

impl<S: StoreClient> Clone for LookupRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<S: StoreClient> std::fmt::Debug for LookupRegistry<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LookupRegistry")
            .field("config", &self.inner.config)
            .field("service_pollers", &self.service_poller_count())
            .field("command_pollers", &self.command_poller_count())
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<S: StoreClient> LookupRegistry<S> {
    /// Validates `config`, starts the dispatcher and the heartbeat loop
    pub fn new(
        store: Arc<S>,
        config: RegistryConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;
        let config = config.validate()?;

        let service_listeners = Arc::new(ServiceListenerTable::new());
        let command_listeners = Arc::new(CommandListenerTable::new());
        let dispatcher = NotifyDispatcher::start(
            config.notify.clone(),
            service_listeners.clone(),
            command_listeners.clone(),
        );
        let heartbeat = Arc::new(HeartbeatManager::new(store.clone(), &config.heartbeat));

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let heartbeat_task = runtime.spawn(heartbeat.clone().run(shutdown_rx));

        let inner = Arc::new(RegistryInner {
            store,
            config,
            services: ServiceCache::new(),
            commands: CommandCache::new(),
            cursors: PollCursors::default(),
            service_listeners,
            command_listeners,
            dispatcher: dispatcher.clone(),
            heartbeat,
            pending_services: DashSet::new(),
            pending_commands: DashSet::new(),
            population_gates: DashMap::new(),
        });
        let lifecycle = Arc::new(Lifecycle {
            runtime,
            shutdown_tx,
            closed: AtomicBool::new(false),
            service_groups: ActiveGroups::default(),
            command_groups: ActiveGroups::default(),
            tasks: Mutex::new(vec![heartbeat_task]),
            dispatcher,
        });

        info!(config = ?inner.config, "lookup registry started");
        Ok(Self { inner, lifecycle })
    }

    /// Registers `address` in the store and keeps it healthy
    ///
    /// The instance is acknowledged once right away, then by the heartbeat
    /// loop. Registering again re-arms a heartbeat removed earlier.
    pub async fn register(
        &self,
        address: &Address,
    ) -> Result<()> {
        let descriptor = InstanceDescriptor::from_address(address, self.inner.config.heartbeat.service_ttl())?;
        let id = descriptor.id.clone();

        self.inner.store.register_instance(descriptor).await?;
        self.inner.store.acknowledge_health(&id).await?;
        self.inner.heartbeat.add_instance_id(id.clone());

        info!(instance_id = %id, "registered instance");
        Ok(())
    }

    /// Stops the heartbeat of `address` and removes it from the store
    pub async fn unregister(
        &self,
        address: &Address,
    ) -> Result<()> {
        let id = instance_id(address);
        self.inner.heartbeat.remove_instance_id(&id);
        self.inner.store.deregister_instance(&id).await?;

        info!(instance_id = %id, "unregistered instance");
        Ok(())
    }

    /// `None` opens the global heartbeat switch; per-address control is unsupported
    pub fn set_available(
        &self,
        address: Option<&Address>,
    ) -> Result<()> {
        self.set_availability(address, true)
    }

    /// `None` closes the global heartbeat switch; per-address control is unsupported
    pub fn set_unavailable(
        &self,
        address: Option<&Address>,
    ) -> Result<()> {
        self.set_availability(address, false)
    }

    fn set_availability(
        &self,
        address: Option<&Address>,
        available: bool,
    ) -> Result<()> {
        match address {
            None => {
                self.inner.heartbeat.set_open(available);
                Ok(())
            }
            Some(address) => Err(Error::UnsupportedOperation(format!(
                "availability of a single address ({}) can not be changed",
                address
            ))),
        }
    }

    /// Calls `listener` with the addresses of `address`'s cluster on every change
    ///
    /// Starts the group's service poller if none runs yet.
    pub fn subscribe_service(
        &self,
        address: &Address,
        listener: Arc<dyn ServiceListener>,
    ) -> Result<()> {
        self.ensure_running()?;
        self.inner
            .service_listeners
            .insert(address.cluster_key(), address.clone(), listener);
        debug!(subscriber = %address, "service listener added");

        if self.lifecycle.service_groups.claim(address.group()) {
            self.spawn_poller(PollKind::Service, address.group())?;
        }
        Ok(())
    }

    /// Removes the listener registered by `address`; the poller keeps running
    pub fn unsubscribe_service(
        &self,
        address: &Address,
    ) -> bool {
        let removed = self
            .inner
            .service_listeners
            .remove(&address.cluster_key(), address);
        debug!(subscriber = %address, removed, "service listener removed");
        removed
    }

    /// Calls `listener` with the command of `address`'s group on every change
    ///
    /// Starts the group's command poller if none runs yet.
    pub fn subscribe_command(
        &self,
        address: &Address,
        listener: Arc<dyn CommandListener>,
    ) -> Result<()> {
        self.ensure_running()?;
        self.inner
            .command_listeners
            .insert(address.group().to_string(), address.clone(), listener);
        debug!(subscriber = %address, "command listener added");

        if self.lifecycle.command_groups.claim(address.group()) {
            self.spawn_poller(PollKind::Command, address.group())?;
        }
        Ok(())
    }

    /// Removes the listener registered by `address`; the poller keeps running
    pub fn unsubscribe_command(
        &self,
        address: &Address,
    ) -> bool {
        let removed = self
            .inner
            .command_listeners
            .remove(&address.group().to_string(), address);
        debug!(subscriber = %address, removed, "command listener removed");
        removed
    }

    /// Returns the cached addresses of `address`'s cluster
    ///
    /// A group never populated is fetched once, without notifying anyone and
    /// without starting a poller. Concurrent first lookups of a group share
    /// that one fetch.
    pub async fn discover_service(
        &self,
        address: &Address,
    ) -> Result<Vec<Address>> {
        let group = address.group();
        if !self.inner.services.contains_group(group) {
            let gate = self.inner.population_gate(group);
            let _populating = gate.lock().await;
            if !self.inner.services.contains_group(group) {
                // A plain lookup must not long-poll, so ask from index 0
                let view = self.inner.store.fetch_healthy_instances(&service_name(group), 0).await?;
                self.inner.apply_service_snapshot(group, view, false);
            }
        }

        Ok(self
            .inner
            .services
            .get(&address.cluster_key())
            .map(|addresses| addresses.as_ref().clone())
            .unwrap_or_default())
    }

    /// Fetches the current command of `address`'s group
    ///
    /// Always goes to the store and refreshes the cache; never notifies.
    pub async fn discover_command(
        &self,
        address: &Address,
    ) -> Result<String> {
        let group = address.group();
        let command = self.inner.store.fetch_command(group).await?;
        self.inner.update_command_cache(group, &command, false);
        Ok(command)
    }

    /// Stops every poller, the heartbeat loop and the dispatcher
    ///
    /// Later subscriptions fail with [`DispatchError::ShutDown`].
    pub async fn shutdown(&self) {
        if self.lifecycle.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("lookup registry shutting down");

        // Sent under the task lock: a poller spawned concurrently either holds
        // its receiver before this send or sees `closed` and never starts
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.lifecycle.tasks.lock();
            let _ = self.lifecycle.shutdown_tx.send(());
            std::mem::take(&mut *tasks)
        };
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "background task ended abnormally");
            }
        }

        let dispatcher = self.inner.dispatcher.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await {
            error!(error = %e, "notify dispatcher shutdown failed");
        }
        info!("lookup registry stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lifecycle.closed.load(Ordering::Acquire)
    }

    pub fn service_poller_count(&self) -> usize {
        self.lifecycle.service_groups.len()
    }

    pub fn command_poller_count(&self) -> usize {
        self.lifecycle.command_groups.len()
    }

    pub fn is_service_polling(
        &self,
        group: &str,
    ) -> bool {
        self.lifecycle.service_groups.contains(group)
    }

    pub fn is_command_polling(
        &self,
        group: &str,
    ) -> bool {
        self.lifecycle.command_groups.contains(group)
    }

    /// Last store index applied for `group`, 0 before the first update
    pub fn cursor(
        &self,
        group: &str,
    ) -> u64 {
        self.inner.cursors.current(group)
    }

    /// Cached addresses of `key` without touching the store
    pub fn cached_addresses(
        &self,
        key: &ClusterKey,
    ) -> Option<Vec<Address>> {
        self.inner.services.get(key).map(|addresses| addresses.as_ref().clone())
    }

    pub fn cached_command(
        &self,
        group: &str,
    ) -> Option<String> {
        self.inner.commands.get(group)
    }

    pub fn service_subscriber_count(
        &self,
        key: &ClusterKey,
    ) -> usize {
        self.inner.service_listeners.subscriber_count(key)
    }

    pub fn command_subscriber_count(
        &self,
        group: &str,
    ) -> usize {
        self.inner.command_listeners.subscriber_count(&group.to_string())
    }

    pub fn heartbeat(&self) -> &HeartbeatManager<S> {
        &self.inner.heartbeat
    }

    pub fn notifications_delivered(&self) -> u64 {
        self.inner.dispatcher.delivered_count()
    }

    pub fn notifications_dropped(&self) -> u64 {
        self.inner.dispatcher.dropped_count()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown.into());
        }
        Ok(())
    }

    /// Starts the poller of `group`, unless the registry is shutting down
    pub(super) fn spawn_poller(
        &self,
        kind: PollKind,
        group: &str,
    ) -> Result<()> {
        let mut tasks = self.lifecycle.tasks.lock();
        if self.is_shut_down() {
            debug!(kind = kind.as_str(), %group, "registry closed, poller not started");
            return Err(DispatchError::ShutDown.into());
        }

        let shutdown_rx = self.lifecycle.shutdown_tx.subscribe();
        let task = self.lifecycle.runtime.spawn(run_poller(
            self.inner.clone(),
            kind,
            group.to_string(),
            shutdown_rx,
        ));
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        Ok(())
    }

    /// Background tasks not yet finished, heartbeat loop included
    #[cfg(test)]
    pub(super) fn live_task_count(&self) -> usize {
        self.lifecycle.tasks.lock().iter().filter(|task| !task.is_finished()).count()
    }
}
