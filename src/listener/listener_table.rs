use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::CommandListener;
use super::ServiceListener;
use crate::Address;
use crate::ClusterKey;

type Subscribers<L> = HashMap<Address, Arc<L>>;

/// Listeners keyed by `K`, then by subscriber address
///
/// Each inner map has its own lock, held only for an insert, a remove or
/// the copy taken by [`ListenerTable::snapshot`]. Delivery iterates the copy,
/// so callbacks never run under the lock. Inner maps are kept once created,
/// even when emptied.
pub struct ListenerTable<K, L: ?Sized> {
    entries: DashMap<K, Arc<Mutex<Subscribers<L>>>>,
}

/// Service listeners per cluster
pub type ServiceListenerTable = ListenerTable<ClusterKey, dyn ServiceListener>;

/// Command listeners per group
pub type CommandListenerTable = ListenerTable<String, dyn CommandListener>;

impl<K, L> Default for ListenerTable<K, L>
where
    K: Eq + Hash + Clone,
    L: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, L> ListenerTable<K, L>
where
    K: Eq + Hash + Clone,
    L: ?Sized,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers `listener` for `subscriber`, returning the listener it replaced
    pub fn insert(
        &self,
        key: K,
        subscriber: Address,
        listener: Arc<L>,
    ) -> Option<Arc<L>> {
        // Clone the inner map out so the shard lock is released before locking it
        let subscribers = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone();
        let mut guard = subscribers.lock();
        guard.insert(subscriber, listener)
    }

    /// Removes the listener registered for `subscriber`; false if there was none
    pub fn remove(
        &self,
        key: &K,
        subscriber: &Address,
    ) -> bool {
        let subscribers = match self.entries.get(key) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        let mut guard = subscribers.lock();
        guard.remove(subscriber).is_some()
    }

    /// Copy of the current listeners for `key`; `None` if nobody ever subscribed
    pub fn snapshot(
        &self,
        key: &K,
    ) -> Option<Vec<(Address, Arc<L>)>> {
        let subscribers = self.entries.get(key)?.value().clone();
        let guard = subscribers.lock();
        Some(guard.iter().map(|(addr, listener)| (addr.clone(), listener.clone())).collect())
    }

    pub fn subscriber_count(
        &self,
        key: &K,
    ) -> usize {
        self.entries.get(key).map(|entry| entry.value().lock().len()).unwrap_or(0)
    }

    pub fn contains(
        &self,
        key: &K,
        subscriber: &Address,
    ) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.value().lock().contains_key(subscriber))
            .unwrap_or(false)
    }
}
