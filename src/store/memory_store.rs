use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use super::IndexedInstances;
use super::StoreClient;
use crate::InstanceDescriptor;
use crate::Result;
use crate::StoreError;

#[derive(Debug)]
struct StoredInstance {
    descriptor: InstanceDescriptor,
    last_pass: Option<Instant>,
    passing: bool,
    ack_count: u64,
}

impl StoredInstance {
    fn new(descriptor: InstanceDescriptor) -> Self {
        Self {
            descriptor,
            last_pass: None,
            passing: false,
            ack_count: 0,
        }
    }

    fn ttl_alive(
        &self,
        now: Instant,
    ) -> bool {
        self.last_pass
            .map(|at| now.duration_since(at) < self.descriptor.ttl)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    index: u64,
    instances: HashMap<String, StoredInstance>,
    commands: HashMap<String, String>,
}

impl StoreState {
    fn bump(&mut self) {
        self.index += 1;
    }

    /// Re-evaluates TTL health; a lapse or recovery is an observable change
    fn refresh_health(&mut self) -> bool {
        let now = Instant::now();
        let mut flipped = false;
        for instance in self.instances.values_mut() {
            let alive = instance.ttl_alive(now);
            if alive != instance.passing {
                instance.passing = alive;
                flipped = true;
            }
        }
        if flipped {
            self.bump();
        }
        flipped
    }

    fn healthy_view(
        &self,
        logical_name: &str,
    ) -> IndexedInstances {
        let mut instances: Vec<InstanceDescriptor> = self
            .instances
            .values()
            .filter(|i| i.passing && i.descriptor.name == logical_name)
            .map(|i| i.descriptor.clone())
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        IndexedInstances {
            index: self.index,
            instances,
        }
    }
}

/// In-process coordination store
///
/// - Every observable change (registration, deregistration, health flip,
///   command update) bumps a single store-wide index.
/// - Instances start critical and turn passing on acknowledgment; they lapse
///   once their TTL elapses without one.
/// - `fetch_healthy_instances` behaves like a blocking query: when the index
///   has not moved past `last_index` it waits up to the block timeout for a
///   change before answering.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    changed: Notify,
    block_timeout: Duration,
    outage: AtomicBool,
    instance_fetches: DashMap<String, u64>,
    command_fetches: DashMap<String, u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store answering every query immediately
    pub fn new() -> Self {
        Self::with_block_timeout(Duration::ZERO)
    }

    /// Store holding unchanged queries for up to `block_timeout`
    pub fn with_block_timeout(block_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            changed: Notify::new(),
            block_timeout,
            outage: AtomicBool::new(false),
            instance_fetches: DashMap::new(),
            command_fetches: DashMap::new(),
        }
    }

    /// Publishes `command` for `group`
    pub fn set_command(
        &self,
        group: &str,
        command: &str,
    ) {
        let mut state = self.state.lock();
        if state.commands.get(group).map(String::as_str) == Some(command) {
            return;
        }
        state.commands.insert(group.to_string(), command.to_string());
        state.bump();
        drop(state);
        self.changed.notify_waiters();
    }

    /// Inserts a descriptor as-is, bypassing the client path
    ///
    /// Lets callers seed instances whose tags the registry cannot decode.
    pub fn insert_descriptor(
        &self,
        descriptor: InstanceDescriptor,
        passing: bool,
    ) {
        let mut stored = StoredInstance::new(descriptor);
        if passing {
            stored.last_pass = Some(Instant::now());
            stored.passing = true;
        }
        let mut state = self.state.lock();
        state.instances.insert(stored.descriptor.id.clone(), stored);
        state.bump();
        drop(state);
        self.changed.notify_waiters();
    }

    /// While set, every client call fails with [`StoreError::Unavailable`]
    pub fn set_outage(
        &self,
        outage: bool,
    ) {
        self.outage.store(outage, Ordering::Release);
    }

    pub fn index(&self) -> u64 {
        self.state.lock().index
    }

    pub fn instance(
        &self,
        id: &str,
    ) -> Option<InstanceDescriptor> {
        self.state.lock().instances.get(id).map(|i| i.descriptor.clone())
    }

    pub fn is_passing(
        &self,
        id: &str,
    ) -> bool {
        let mut state = self.state.lock();
        state.refresh_health();
        state.instances.get(id).map(|i| i.passing).unwrap_or(false)
    }

    /// Number of health acknowledgments received for `id`
    pub fn ack_count(
        &self,
        id: &str,
    ) -> u64 {
        self.state.lock().instances.get(id).map(|i| i.ack_count).unwrap_or(0)
    }

    /// Number of instance queries issued for `logical_name`
    pub fn instance_fetch_count(
        &self,
        logical_name: &str,
    ) -> u64 {
        self.instance_fetches.get(logical_name).map(|c| *c).unwrap_or(0)
    }

    /// Number of command queries issued for `group`
    pub fn command_fetch_count(
        &self,
        group: &str,
    ) -> u64 {
        self.command_fetches.get(group).map(|c| *c).unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.outage.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("memory store outage".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn register_instance(
        &self,
        descriptor: InstanceDescriptor,
    ) -> Result<()> {
        self.check_available()?;
        if descriptor.ttl.is_zero() {
            return Err(StoreError::Rejected {
                id: descriptor.id,
                reason: "ttl must be positive".to_string(),
            }
            .into());
        }

        let mut state = self.state.lock();
        if let Some(existing) = state.instances.get(&descriptor.id) {
            if existing.descriptor == descriptor {
                trace!(instance_id = %descriptor.id, "instance already registered");
                return Ok(());
            }
        }
        debug!(instance_id = %descriptor.id, name = %descriptor.name, "register instance");
        state.instances.insert(descriptor.id.clone(), StoredInstance::new(descriptor));
        state.bump();
        drop(state);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn deregister_instance(
        &self,
        id: &str,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock();
        if state.instances.remove(id).is_some() {
            debug!(instance_id = %id, "deregister instance");
            state.bump();
            drop(state);
            self.changed.notify_waiters();
        }
        Ok(())
    }

    async fn acknowledge_health(
        &self,
        id: &str,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock();
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownInstance(id.to_string()))?;
        instance.last_pass = Some(Instant::now());
        instance.ack_count += 1;
        if state.refresh_health() {
            drop(state);
            self.changed.notify_waiters();
        }
        Ok(())
    }

    async fn fetch_healthy_instances(
        &self,
        logical_name: &str,
        last_index: u64,
    ) -> Result<IndexedInstances> {
        self.check_available()?;
        *self.instance_fetches.entry(logical_name.to_string()).or_insert(0) += 1;

        let notified = self.changed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        {
            let mut state = self.state.lock();
            state.refresh_health();
            if state.index > last_index || self.block_timeout.is_zero() {
                return Ok(state.healthy_view(logical_name));
            }
        }

        // Blocking query: hold until something changes or the wait expires
        let _ = tokio::time::timeout(self.block_timeout, notified).await;

        self.check_available()?;
        let mut state = self.state.lock();
        state.refresh_health();
        Ok(state.healthy_view(logical_name))
    }

    async fn fetch_command(
        &self,
        group: &str,
    ) -> Result<String> {
        self.check_available()?;
        *self.command_fetches.entry(group.to_string()).or_insert(0) += 1;
        Ok(self.state.lock().commands.get(group).cloned().unwrap_or_default())
    }
}
