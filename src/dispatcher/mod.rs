//! Asynchronous delivery of change notifications to subscribers.

mod notify_dispatcher;
pub use notify_dispatcher::*;
