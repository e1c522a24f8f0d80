//! Proxy construction
//!
//! The proxy factory turns an identity into the proxy an adapter hands to
//! callers, following the adapter id and replica group configuration. It
//! also owns the published endpoints; replacing them only affects proxies
//! created afterwards.

use parking_lot::RwLock;
use portico_types::{Endpoint, Identity, Proxy};

pub struct ProxyFactory {
    adapter_id: Option<String>,
    replica_group_id: Option<String>,
    published: RwLock<Vec<Endpoint>>,
}

impl ProxyFactory {
    pub fn new(
        adapter_id: Option<String>,
        replica_group_id: Option<String>,
        published: Vec<Endpoint>,
    ) -> Self {
        Self {
            adapter_id,
            replica_group_id,
            published: RwLock::new(published),
        }
    }

    pub fn adapter_id(&self) -> Option<&str> {
        self.adapter_id.as_deref()
    }

    pub fn replica_group_id(&self) -> Option<&str> {
        self.replica_group_id.as_deref()
    }

    /// Proxy following the adapter configuration
    ///
    /// With an adapter id the proxy is indirect and names the replica group
    /// when one is configured, the adapter id otherwise. Without an adapter
    /// id the proxy is direct.
    pub fn create_proxy(&self, identity: Identity, facet: &str) -> Proxy {
        match (&self.adapter_id, &self.replica_group_id) {
            (Some(_), Some(group)) => Proxy::replicated(identity, group.clone()).with_facet(facet),
            (Some(id), None) => Proxy::indirect(identity, id.clone()).with_facet(facet),
            (None, _) => self.create_direct_proxy(identity, facet),
        }
    }

    /// Proxy embedding the published endpoints
    pub fn create_direct_proxy(&self, identity: Identity, facet: &str) -> Proxy {
        Proxy::direct(identity, self.published_endpoints()).with_facet(facet)
    }

    /// Proxy naming the adapter id, or a well-known proxy without one
    pub fn create_indirect_proxy(&self, identity: Identity, facet: &str) -> Proxy {
        match &self.adapter_id {
            Some(id) => Proxy::indirect(identity, id.clone()).with_facet(facet),
            None => Proxy::well_known(identity).with_facet(facet),
        }
    }

    pub fn published_endpoints(&self) -> Vec<Endpoint> {
        self.published.read().clone()
    }

    /// Replace the published endpoints, returning the previous ones
    pub fn set_published_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        std::mem::replace(&mut *self.published.write(), endpoints)
    }
}
