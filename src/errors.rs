//! Registry Error Hierarchy
//!
//! Errors are split by the layer that raises them: configuration, the
//! coordination store, address conversion and notification dispatch.
//! Background loops (pollers, heartbeat sweep, dispatcher jobs) log these
//! and carry on; caller-invoked operations return them.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Coordination store failures (network, timeouts, rejected writes)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Store descriptor <-> address conversion failures
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Notification dispatch failures
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Operation the store integration does not offer
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Registry constructed outside of a tokio runtime
    #[error("No tokio runtime available to drive background tasks")]
    RuntimeUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store endpoint unreachable or answering with a server error
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Request exceeded the store client's own timeout
    #[error("Store request timed out after {0:?}")]
    Timeout(Duration),

    /// Store refused a write
    #[error("Store rejected instance {id}: {reason}")]
    Rejected { id: String, reason: String },

    /// Health acknowledgment or deregistration for an id the store does not know
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),
}

/// Error type for descriptor/address conversions
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Descriptor carries no tag holding its address
    #[error("instance {id} has no address tag")]
    MissingAddressTag { id: String },

    /// Address URI could not be parsed
    #[error("malformed address `{value}`: {reason}")]
    MalformedAddress { value: String, reason: String },

    /// Address fields violate basic rules (empty host, group, ...)
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Pending-job queue at capacity and no worker slot left
    #[error("Notification queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Dispatcher already stopped
    #[error("Notification dispatcher is shut down")]
    ShutDown,
}
