//! Seam to the external coordination store.
//!
//! The registry only needs five abstract operations from the store; the wire
//! client that performs them lives outside this crate. [`MemoryStore`] is an
//! in-process implementation with the same blocking-query and TTL-health
//! semantics, used by tests and by embedders that need a local registry.

mod memory_store;
pub use memory_store::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::InstanceDescriptor;
use crate::Result;

/// Healthy instances of one logical service as of store index `index`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedInstances {
    /// Store-issued monotonic index of this view
    pub index: u64,
    pub instances: Vec<InstanceDescriptor>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    async fn register_instance(
        &self,
        descriptor: InstanceDescriptor,
    ) -> Result<()>;

    async fn deregister_instance(
        &self,
        id: &str,
    ) -> Result<()>;

    /// Marks the instance's TTL check as passing
    async fn acknowledge_health(
        &self,
        id: &str,
    ) -> Result<()>;

    /// Returns the healthy instances registered under `logical_name`.
    ///
    /// The store may block until its index moves past `last_index`; when
    /// nothing changed it answers with an index not greater than `last_index`.
    /// Request timeouts are the implementation's responsibility.
    async fn fetch_healthy_instances(
        &self,
        logical_name: &str,
        last_index: u64,
    ) -> Result<IndexedInstances>;

    /// Returns the routing command currently published for `group`
    async fn fetch_command(
        &self,
        group: &str,
    ) -> Result<String>;
}
