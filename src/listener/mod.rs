//! Subscriber callbacks and the tables that hold them.

mod listener_table;
pub use listener_table::*;


use crate::Address;

/// Receives the current address list of the cluster it subscribed to
pub trait ServiceListener: Send + Sync + 'static {
    /// `subscriber` is the address the listener was registered with
    fn notify_service(
        &self,
        subscriber: &Address,
        addresses: &[Address],
    );
}

/// Receives the routing command published for its group
pub trait CommandListener: Send + Sync + 'static {
    fn notify_command(
        &self,
        subscriber: &Address,
        group: &str,
        command: &str,
    );
}
