mod heartbeat_manager;
pub use heartbeat_manager::*;

#[cfg(test)]
mod heartbeat_manager_test;
