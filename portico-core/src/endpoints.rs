//! Published endpoint computation
//!
//! Direct proxies embed the published endpoints of their adapter. Unless the
//! configuration lists them explicitly, they are derived from the listening
//! endpoints: a wildcard host is expanded to the local interface addresses,
//! and `published_host` replaces every host.

use crate::config::AdapterProperties;
use portico_types::{parse_endpoint_list, Endpoint, ParseError};

/// Source of local interface addresses
pub trait NetworkInterfaces: Send + Sync {
    /// Addresses wildcard endpoints expand to
    fn addresses(&self) -> Vec<String>;
}

/// Reports only the loopback address
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackInterfaces;

impl NetworkInterfaces for LoopbackInterfaces {
    fn addresses(&self) -> Vec<String> {
        vec!["127.0.0.1".to_string()]
    }
}

/// A fixed list of addresses
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces {
    addresses: Vec<String>,
}

impl StaticInterfaces {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

impl NetworkInterfaces for StaticInterfaces {
    fn addresses(&self) -> Vec<String> {
        self.addresses.clone()
    }
}

fn push_unique(endpoints: &mut Vec<Endpoint>, endpoint: Endpoint) {
    if !endpoints.contains(&endpoint) {
        endpoints.push(endpoint);
    }
}

/// Compute the endpoints an adapter publishes
pub fn compute_published_endpoints(
    properties: &AdapterProperties,
    endpoints: &[Endpoint],
    interfaces: &dyn NetworkInterfaces,
) -> Result<Vec<Endpoint>, ParseError> {
    let mut published = Vec::new();

    if let Some(explicit) = properties.published_endpoints() {
        for endpoint in parse_endpoint_list(explicit)? {
            push_unique(&mut published, endpoint);
        }
        return Ok(published);
    }

    for endpoint in endpoints {
        if let Some(host) = properties.published_host() {
            push_unique(&mut published, endpoint.with_host(host));
        } else if endpoint.is_wildcard() {
            for address in interfaces.addresses() {
                push_unique(&mut published, endpoint.with_host(address));
            }
        } else {
            push_unique(&mut published, endpoint.clone());
        }
    }

    Ok(published)
}
