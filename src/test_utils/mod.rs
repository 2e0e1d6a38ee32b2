//! Shared fixtures and recording listeners for unit tests
mod common;
mod listeners;

pub use common::*;
pub use listeners::*;
