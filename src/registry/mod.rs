//! Registry core: caches, poll cursors, group pollers and the public
//! [`LookupRegistry`] facade tying them to the store and the dispatcher.

mod cache;
mod lookup_registry;
mod poller;

pub use cache::*;
pub use lookup_registry::*;
pub(crate) use poller::*;
