use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Identity of "all instances implementing `interface` inside `group`"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    group: String,
    interface: String,
}

impl ClusterKey {
    pub fn new(
        group: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            interface: interface.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.interface)
    }
}
