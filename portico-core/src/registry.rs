//! Locator registry boundary
//!
//! An adapter configured with an adapter id registers its endpoints with a
//! locator registry so indirect proxies can be resolved. The registry is an
//! opaque remote service; this module defines the traits an adapter calls
//! and an in-process implementation used by tests.

use parking_lot::Mutex;
use portico_types::{Endpoint, Identity, Proxy};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Failures reported by a locator registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("adapter id `{0}` is not known to the registry")]
    AdapterNotFound(String),

    #[error("adapter id `{adapter_id}` is not a member of replica group `{group}`")]
    InvalidReplicaGroup { adapter_id: String, group: String },

    #[error("locator registry unavailable: {0}")]
    Unavailable(String),
}

/// Registration interface of a locator service
pub trait LocatorRegistry: Send + Sync {
    /// Register the direct proxy of an adapter; `None` unregisters it
    fn set_adapter_direct_proxy(
        &self,
        adapter_id: &str,
        proxy: Option<Proxy>,
    ) -> Result<(), RegistryError>;

    /// Register the direct proxy of a replica group member; `None`
    /// unregisters it
    fn set_replicated_adapter_direct_proxy(
        &self,
        adapter_id: &str,
        replica_group_id: &str,
        proxy: Option<Proxy>,
    ) -> Result<(), RegistryError>;
}

/// A locator service
pub trait Locator: Send + Sync {
    /// Registration interface, if the locator offers one
    fn registry(&self) -> Option<Arc<dyn LocatorRegistry>>;

    /// Resolve an adapter id or replica group id to its endpoints
    fn find_adapter_by_id(&self, id: &str) -> Option<Vec<Endpoint>>;
}

#[derive(Default)]
struct Registrations {
    adapters: BTreeMap<String, Vec<Endpoint>>,
    groups: BTreeMap<String, BTreeSet<String>>,
    refused: HashSet<String>,
    offline: bool,
}

impl Registrations {
    /// Replica group `adapter_id` is registered in, if any
    fn group_of(&self, adapter_id: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(adapter_id))
            .map(|(group, _)| group.as_str())
    }
}

/// In-process locator registry
#[derive(Default)]
pub struct InMemoryRegistry {
    registrations: Mutex<Registrations>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every registration of `adapter_id` fail with `AdapterNotFound`
    pub fn refuse(&self, adapter_id: impl Into<String>) {
        self.registrations.lock().refused.insert(adapter_id.into());
    }

    /// Take the registry offline (`false`) or back online (`true`)
    ///
    /// While offline every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.registrations.lock().offline = !available;
    }

    /// Ids with a registered proxy
    pub fn adapter_ids(&self) -> Vec<String> {
        self.registrations.lock().adapters.keys().cloned().collect()
    }

    /// Endpoints registered for an adapter id, or the union of the member
    /// endpoints for a replica group id
    pub fn endpoints(&self, id: &str) -> Option<Vec<Endpoint>> {
        let registrations = self.registrations.lock();
        if let Some(endpoints) = registrations.adapters.get(id) {
            return Some(endpoints.clone());
        }

        let members = registrations.groups.get(id)?;
        let mut endpoints = Vec::new();
        for member in members {
            for endpoint in registrations.adapters.get(member).into_iter().flatten() {
                if !endpoints.contains(endpoint) {
                    endpoints.push(endpoint.clone());
                }
            }
        }
        Some(endpoints)
    }

    fn check(registrations: &Registrations, adapter_id: &str) -> Result<(), RegistryError> {
        if registrations.offline {
            return Err(RegistryError::Unavailable(
                "in-memory registry is offline".to_string(),
            ));
        }
        if registrations.refused.contains(adapter_id) {
            return Err(RegistryError::AdapterNotFound(adapter_id.to_string()));
        }
        Ok(())
    }
}

impl LocatorRegistry for InMemoryRegistry {
    fn set_adapter_direct_proxy(
        &self,
        adapter_id: &str,
        proxy: Option<Proxy>,
    ) -> Result<(), RegistryError> {
        let mut registrations = self.registrations.lock();
        Self::check(&registrations, adapter_id)?;
        match proxy {
            Some(proxy) => {
                if let Some(group) = registrations.group_of(adapter_id) {
                    return Err(RegistryError::InvalidReplicaGroup {
                        adapter_id: adapter_id.to_string(),
                        group: group.to_string(),
                    });
                }
                registrations
                    .adapters
                    .insert(adapter_id.to_string(), proxy.endpoints);
            }
            None => {
                registrations.adapters.remove(adapter_id);
            }
        }
        Ok(())
    }

    fn set_replicated_adapter_direct_proxy(
        &self,
        adapter_id: &str,
        replica_group_id: &str,
        proxy: Option<Proxy>,
    ) -> Result<(), RegistryError> {
        let mut registrations = self.registrations.lock();
        Self::check(&registrations, adapter_id)?;
        match proxy {
            Some(proxy) => {
                let standalone = registrations.adapters.contains_key(adapter_id)
                    && registrations.group_of(adapter_id).is_none();
                let elsewhere = registrations
                    .group_of(adapter_id)
                    .is_some_and(|group| group != replica_group_id);
                if standalone || elsewhere {
                    return Err(RegistryError::InvalidReplicaGroup {
                        adapter_id: adapter_id.to_string(),
                        group: replica_group_id.to_string(),
                    });
                }
                registrations
                    .adapters
                    .insert(adapter_id.to_string(), proxy.endpoints);
                registrations
                    .groups
                    .entry(replica_group_id.to_string())
                    .or_default()
                    .insert(adapter_id.to_string());
            }
            None => {
                registrations.adapters.remove(adapter_id);
                if let Some(members) = registrations.groups.get_mut(replica_group_id) {
                    members.remove(adapter_id);
                    if members.is_empty() {
                        registrations.groups.remove(replica_group_id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Locator backed by an [`InMemoryRegistry`]
#[derive(Clone, Default)]
pub struct InMemoryLocator {
    registry: Arc<InMemoryRegistry>,
}

impl InMemoryLocator {
    pub fn new(registry: Arc<InMemoryRegistry>) -> Self {
        Self { registry }
    }

    pub fn in_memory_registry(&self) -> &Arc<InMemoryRegistry> {
        &self.registry
    }
}

impl Locator for InMemoryLocator {
    fn registry(&self) -> Option<Arc<dyn LocatorRegistry>> {
        Some(self.registry.clone())
    }

    fn find_adapter_by_id(&self, id: &str) -> Option<Vec<Endpoint>> {
        self.registry.endpoints(id)
    }
}

/// Identity of the proxy an adapter registers with the locator registry
pub(crate) fn registration_identity() -> Identity {
    Identity::new("dummy")
}
