//! Client-side service registry adapter.
//!
//! Keeps provider addresses and routing commands of service groups current
//! against an external coordination store:
//!
//! - [`LookupRegistry`] owns per-group caches and listener tables, and
//!   lazily starts one service poller and one command poller per group on
//!   first subscription.
//! - Pollers long-poll the store through [`StoreClient`], drop stale
//!   responses by store index and hand real changes to the
//!   [`NotifyDispatcher`], which calls listeners on its own worker threads.
//! - [`HeartbeatManager`] keeps registered instances healthy in the store.
//!
//! [`MemoryStore`] is an in-process store with blocking queries and TTL
//! health for embedding and tests.

mod address;
mod config;
mod constants;
mod dispatcher;
mod errors;
mod heartbeat;
mod listener;
pub mod metrics;
mod registry;
mod store;

pub use address::*;
pub use config::*;
pub use constants::*;
pub use dispatcher::*;
pub use errors::*;
pub use heartbeat::*;
pub use listener::*;
pub use registry::*;
pub use store::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
mod errors_test;

#[cfg(test)]
pub(crate) mod test_utils;
