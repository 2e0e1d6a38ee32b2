use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::Address;
use crate::ClusterKey;

/// Addresses of one group, grouped by cluster
pub type GroupAddresses = BTreeMap<ClusterKey, Vec<Address>>;

/// Two address lists are the same iff they have equal length and every
/// element of `a` is contained in `b`
pub fn same_addresses(
    a: &[Address],
    b: &[Address],
) -> bool {
    a.len() == b.len() && a.iter().all(|address| b.contains(address))
}

/// Cached address lists per group, then per cluster
///
/// Lists are shared as `Arc<Vec<_>>` and replaced wholesale, never
/// mutated in place.
#[derive(Debug, Default)]
pub struct ServiceCache {
    groups: DashMap<String, Arc<Mutex<HashMap<ClusterKey, Arc<Vec<Address>>>>>>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_group(
        &self,
        group: &str,
    ) -> bool {
        self.groups.contains_key(group)
    }

    pub fn get(
        &self,
        key: &ClusterKey,
    ) -> Option<Arc<Vec<Address>>> {
        let clusters = self.groups.get(key.group())?.value().clone();
        let guard = clusters.lock();
        guard.get(key).cloned()
    }

    /// Merges a fresh snapshot of `group` and returns the clusters whose list changed
    ///
    /// The first snapshot of a group installs every cluster and reports all
    /// of them. Afterwards a cluster is reported only when its new list is
    /// not the same as the cached one. Empty lists and clusters missing from
    /// `snapshot` leave the cache untouched; an empty snapshot does not
    /// populate the group.
    pub fn apply(
        &self,
        group: &str,
        snapshot: GroupAddresses,
    ) -> Vec<(ClusterKey, Arc<Vec<Address>>)> {
        if snapshot.values().all(Vec::is_empty) {
            return Vec::new();
        }

        let mut changed = Vec::new();
        let clusters = match self.groups.entry(group.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let installed: HashMap<ClusterKey, Arc<Vec<Address>>> = snapshot
                    .into_iter()
                    .filter(|(_, addresses)| !addresses.is_empty())
                    .map(|(key, addresses)| (key, Arc::new(addresses)))
                    .collect();
                changed.extend(installed.iter().map(|(key, list)| (key.clone(), list.clone())));
                entry.insert(Arc::new(Mutex::new(installed)));
                return changed;
            }
        };

        let mut guard = clusters.lock();
        for (key, addresses) in snapshot {
            if addresses.is_empty() {
                continue;
            }
            if let Some(cached) = guard.get(&key) {
                if same_addresses(&addresses, cached) {
                    continue;
                }
            }
            let list = Arc::new(addresses);
            guard.insert(key.clone(), list.clone());
            changed.push((key, list));
        }
        changed
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Last command seen per group
#[derive(Debug, Default)]
pub struct CommandCache {
    commands: DashMap<String, String>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        group: &str,
    ) -> Option<String> {
        self.commands.get(group).map(|command| command.value().clone())
    }

    /// Stores `command` and reports whether it differs from the cached one
    ///
    /// An absent entry differs from every command, including `""`.
    pub fn apply(
        &self,
        group: &str,
        command: &str,
    ) -> bool {
        match self.commands.entry(group.to_string()) {
            Entry::Occupied(entry) if entry.get() == command => false,
            Entry::Occupied(mut entry) => {
                entry.insert(command.to_string());
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(command.to_string());
                true
            }
        }
    }
}
