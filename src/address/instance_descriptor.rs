use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::Address;
use crate::constants::ADDRESS_TAG_PREFIX;
use crate::constants::SERVICE_NAME_PREFIX;
use crate::ConvertError;

/// The store's native representation of a running instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Store-wide unique id, `host:port-interface`
    pub id: String,
    /// Logical service name the store groups instances under
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Free-form tags; one of them carries the encoded address
    pub tags: Vec<String>,
    /// Health lapses when no acknowledgment arrives within this TTL
    pub ttl: Duration,
}

impl InstanceDescriptor {
    /// Builds the descriptor registered for `address`
    pub fn from_address(
        address: &Address,
        ttl: Duration,
    ) -> Result<Self, ConvertError> {
        address.validate()?;
        Ok(Self {
            id: instance_id(address),
            name: service_name(address.group()),
            host: address.host().to_string(),
            port: address.port(),
            tags: vec![format!("{}{}", ADDRESS_TAG_PREFIX, address.to_uri())],
            ttl,
        })
    }

    /// Recovers the address carried in the descriptor's tags
    pub fn to_address(&self) -> Result<Address, ConvertError> {
        let encoded = self
            .tags
            .iter()
            .find_map(|tag| tag.strip_prefix(ADDRESS_TAG_PREFIX))
            .ok_or_else(|| ConvertError::MissingAddressTag { id: self.id.clone() })?;
        Address::parse_uri(encoded)
    }
}

/// Store id of the instance behind `address`
pub fn instance_id(address: &Address) -> String {
    format!("{}:{}-{}", address.host(), address.port(), address.interface())
}

/// Logical store name under which all instances of `group` are registered
pub fn service_name(group: &str) -> String {
    format!("{}{}", SERVICE_NAME_PREFIX, group)
}
