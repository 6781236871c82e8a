//! Cluster-internal service addresses
//!
//! A service address is one or more DNS labels (`[a-z0-9]([-a-z0-9]*[a-z0-9])?`)
//! joined by `.` and terminated by the literal `.svc.cluster.local`. Anything
//! accepted here is safe to embed as a single proxy path segment: it contains
//! no `/`, `:`, `%`, `?`, `#`, whitespace or uppercase characters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

/// Mandatory suffix of every in-cluster service address
pub const CLUSTER_SUFFIX: &str = ".svc.cluster.local";

/// Check whether `address` is a well-formed in-cluster service address.
///
/// Full-string match, lowercase only, no trailing dot.
pub fn validate(address: &str) -> bool {
    let Some(prefix) = address.strip_suffix(CLUSTER_SUFFIX) else {
        return false;
    };
    !prefix.is_empty() && prefix.split('.').all(is_dns_label)
}

fn is_dns_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    is_alnum(*first)
        && is_alnum(*last)
        && bytes.iter().all(|b| is_alnum(*b) || *b == b'-')
}

fn is_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn invalid_address(address: &str) -> GatewayError {
    GatewayError::ValidationError(format!(
        "Invalid service address '{}'. Expected format: service-name.namespace.svc.cluster.local",
        address
    ))
}

/// A string attested to match the service address grammar
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceAddress(String);

impl ServiceAddress {
    pub fn parse(address: &str) -> Result<Self, GatewayError> {
        if validate(address) {
            Ok(Self(address.to_string()))
        } else {
            Err(invalid_address(address))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Service name (first label)
    pub fn service(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ServiceAddress {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServiceAddress {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if validate(&value) {
            Ok(Self(value))
        } else {
            Err(invalid_address(&value))
        }
    }
}

impl From<ServiceAddress> for String {
    fn from(address: ServiceAddress) -> Self {
        address.0
    }
}
