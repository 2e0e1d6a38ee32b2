use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use super::ClusterKey;
use crate::constants::ADDRESS_URI_SCHEME;
use crate::constants::GROUP_QUERY_KEY;
use crate::ConvertError;

/// One service endpoint
///
/// Immutable once built. Two addresses are equal when host, port, group and
/// interface match; metadata does not take part in equality or hashing.
///
/// The textual form is a URI:
///
/// ```text
/// lnk://10.0.0.1:9000/io.lnk.AuthService?group=g1&version=1.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
    group: String,
    interface: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl Address {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        group: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            group: group.into(),
            interface: interface.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Returns a copy carrying one more metadata entry
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_value(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn cluster_key(&self) -> ClusterKey {
        ClusterKey::new(self.group.clone(), self.interface.clone())
    }

    /// Checks the fields needed to register or encode this address
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.host.is_empty() {
            return Err(ConvertError::InvalidAddress("host is empty".into()));
        }
        if self.port == 0 {
            return Err(ConvertError::InvalidAddress(format!("port 0 for host {}", self.host)));
        }
        if self.group.is_empty() {
            return Err(ConvertError::InvalidAddress("service group is empty".into()));
        }
        if self.interface.is_empty() {
            return Err(ConvertError::InvalidAddress("interface is empty".into()));
        }
        if let Some(c) = self.interface.chars().find(|c| !is_interface_char(*c)) {
            return Err(ConvertError::InvalidAddress(format!(
                "interface `{}` contains `{}`",
                self.interface, c
            )));
        }
        Ok(())
    }

    /// Encodes the address as `lnk://host:port/interface?group=..&meta..`
    pub fn to_uri(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let base = format!("{}://{}:{}/", ADDRESS_URI_SCHEME, host, self.port);
        match Url::parse(&base) {
            Ok(mut uri) => {
                uri.set_path(&self.interface);
                {
                    let mut query = uri.query_pairs_mut();
                    query.append_pair(GROUP_QUERY_KEY, &self.group);
                    for (key, value) in &self.metadata {
                        query.append_pair(key, value);
                    }
                }
                uri.into()
            }
            // Only reachable for hosts `Url` refuses; keep a readable form for logs.
            Err(_) => format!("{}{}?{}={}", base, self.interface, GROUP_QUERY_KEY, self.group),
        }
    }

    /// Decodes the form produced by [`Address::to_uri`]
    pub fn parse_uri(value: &str) -> Result<Self, ConvertError> {
        let malformed = |reason: String| ConvertError::MalformedAddress {
            value: value.to_string(),
            reason,
        };

        let uri = Url::parse(value).map_err(|e| malformed(e.to_string()))?;
        if uri.scheme() != ADDRESS_URI_SCHEME {
            return Err(malformed(format!("unexpected scheme `{}`", uri.scheme())));
        }

        let host = uri
            .host_str()
            .ok_or_else(|| malformed("missing host".into()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port().ok_or_else(|| malformed("missing port".into()))?;
        let interface = uri.path().trim_start_matches('/').to_string();
        if interface.contains('%') {
            return Err(malformed(format!("encoded interface `{}`", interface)));
        }

        let mut group = None;
        let mut metadata = BTreeMap::new();
        for (key, val) in uri.query_pairs() {
            if key == GROUP_QUERY_KEY {
                group = Some(val.into_owned());
            } else {
                metadata.insert(key.into_owned(), val.into_owned());
            }
        }
        let group = group.ok_or_else(|| malformed("missing group".into()))?;

        let address = Self {
            host,
            port,
            group,
            interface,
            metadata,
        };
        address.validate().map_err(|e| malformed(e.to_string()))?;
        Ok(address)
    }
}

fn is_interface_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '$' | ':')
}

impl PartialEq for Address {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.group == other.group
            && self.interface == other.interface
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.host.hash(state);
        self.port.hash(state);
        self.group.hash(state);
        self.interface.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for Address {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_uri(s)
    }
}
