//! Proxies handed back to callers
//!
//! A proxy is a value, built on demand and never stored by the adapter. A
//! direct proxy embeds endpoints; an indirect proxy names an adapter id or a
//! replica group id that callers resolve through a locator service; a
//! well-known proxy carries only the identity.

use crate::endpoint::Endpoint;
use crate::identity::{FacetKey, Identity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Description of a remote object reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub identity: Identity,
    #[serde(default)]
    pub facet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

impl Proxy {
    /// A proxy that carries only an identity
    pub fn well_known(identity: Identity) -> Self {
        Self {
            identity,
            facet: String::new(),
            adapter_id: None,
            replica_group_id: None,
            endpoints: Vec::new(),
        }
    }

    /// A direct proxy embedding the given endpoints
    pub fn direct(identity: Identity, endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            ..Self::well_known(identity)
        }
    }

    /// An indirect proxy referring to an object adapter id
    pub fn indirect(identity: Identity, adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: Some(adapter_id.into()),
            ..Self::well_known(identity)
        }
    }

    /// An indirect proxy referring to a replica group
    pub fn replicated(identity: Identity, replica_group_id: impl Into<String>) -> Self {
        Self {
            replica_group_id: Some(replica_group_id.into()),
            ..Self::well_known(identity)
        }
    }

    /// Set the facet this proxy addresses
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = facet.into();
        self
    }

    /// Key of the servant this proxy addresses
    pub fn facet_key(&self) -> FacetKey {
        FacetKey::new(self.identity.clone(), self.facet.clone())
    }

    /// Check whether the proxy embeds endpoints
    pub fn is_direct(&self) -> bool {
        !self.endpoints.is_empty()
    }

    /// Check whether the proxy must be resolved through a locator
    pub fn is_indirect(&self) -> bool {
        !self.is_direct()
    }

    /// Check whether the proxy carries neither endpoints nor a location
    pub fn is_well_known(&self) -> bool {
        self.endpoints.is_empty() && self.location().is_none()
    }

    /// The id a locator resolves this proxy with; a replica group wins over
    /// a plain adapter id
    pub fn location(&self) -> Option<&str> {
        self.replica_group_id
            .as_deref()
            .or(self.adapter_id.as_deref())
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)?;
        if !self.facet.is_empty() {
            write!(f, " -f {}", self.facet)?;
        }
        if let Some(location) = self.location() {
            write!(f, " @ {}", location)?;
        }
        for endpoint in &self.endpoints {
            write!(f, ":{}", endpoint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_proxy() {
        let proxy = Proxy::direct(Identity::new("test"), vec![Endpoint::tcp("", 4061)]);
        assert!(proxy.is_direct());
        assert!(!proxy.is_well_known());
        assert_eq!(proxy.to_string(), "test:tcp -p 4061");
    }

    #[test]
    fn test_indirect_proxy() {
        let proxy = Proxy::indirect(Identity::new("test"), "A1").with_facet("admin");
        assert!(proxy.is_indirect());
        assert_eq!(proxy.location(), Some("A1"));
        assert_eq!(proxy.to_string(), "test -f admin @ A1");
    }

    #[test]
    fn test_replica_group_wins() {
        let mut proxy = Proxy::replicated(Identity::new("test"), "G");
        proxy.adapter_id = Some("A1".to_string());
        assert_eq!(proxy.location(), Some("G"));
    }

    #[test]
    fn test_well_known_proxy() {
        let proxy = Proxy::well_known(Identity::new("printer").with_category("office"));
        assert!(proxy.is_well_known());
        assert_eq!(proxy.to_string(), "office/printer");
        assert_eq!(proxy.facet_key(), FacetKey::default_facet(proxy.identity.clone()));
    }
}
