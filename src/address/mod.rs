//! Endpoint model shared by the registry, the store seam and subscribers.
//!
//! An [`Address`] is one service endpoint. A [`ClusterKey`] names the set of
//! endpoints implementing one interface inside one group, which is the unit
//! of caching and subscription. [`InstanceDescriptor`] is the store's native
//! form of a running instance; conversion happens only at the store seam.

mod cluster_key;
mod instance_descriptor;
mod service_address;

pub use cluster_key::*;
pub use instance_descriptor::*;
pub use service_address::*;
