//! Communicator: owner of the object adapters of a process
//!
//! The communicator is built from an explicit configuration and hands out
//! named adapters. Adapter names are unique while the adapter lives;
//! destroying an adapter frees its name.

use crate::adapter::{AdapterInit, ObjectAdapter};
use crate::config::{AdapterProperties, PorticoConfig};
use crate::endpoints::{LoopbackInterfaces, NetworkInterfaces};
use crate::error::{AdapterError, RegistrationKind, Result};
use crate::registry::Locator;
use parking_lot::Mutex;
use portico_types::{parse_endpoint_list, Endpoint};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct Adapters {
    by_name: BTreeMap<String, Arc<ObjectAdapter>>,
    shut_down: bool,
}

/// Creates adapters and tracks them by name
pub struct AdapterFactory {
    config: PorticoConfig,
    interfaces: Arc<dyn NetworkInterfaces>,
    default_locator: Option<Arc<dyn Locator>>,
    adapters: Mutex<Adapters>,
}

impl AdapterFactory {
    fn create(
        self: &Arc<Self>,
        name: &str,
        endpoints: Option<Vec<Endpoint>>,
    ) -> Result<Arc<ObjectAdapter>> {
        let mut adapters = self.adapters.lock();
        if adapters.shut_down {
            return Err(AdapterError::Deactivated(name.to_string()));
        }

        let (name, properties) = if name.is_empty() {
            (Uuid::new_v4().to_string(), AdapterProperties::default())
        } else if adapters.by_name.contains_key(name) {
            return Err(AdapterError::already_registered(
                RegistrationKind::ObjectAdapter,
                name,
            ));
        } else {
            (name.to_string(), self.config.adapter(name))
        };

        let adapter = Arc::new(ObjectAdapter::new(AdapterInit {
            name: name.clone(),
            properties,
            endpoints,
            interfaces: self.interfaces.clone(),
            locator: self.default_locator.clone(),
            owner: Arc::downgrade(self),
        })?);
        adapters.by_name.insert(name, adapter.clone());

        info!(
            adapter = %adapter.name(),
            endpoints = adapter.endpoints().len(),
            "Created object adapter"
        );
        Ok(adapter)
    }

    /// Forget a destroyed adapter
    pub(crate) fn remove_adapter(&self, name: &str) {
        if self.adapters.lock().by_name.remove(name).is_some() {
            debug!(adapter = %name, "Removed object adapter from communicator");
        }
    }

    fn snapshot(&self) -> Vec<Arc<ObjectAdapter>> {
        self.adapters.lock().by_name.values().cloned().collect()
    }
}

/// Builder for [`Communicator`]
pub struct CommunicatorBuilder {
    config: PorticoConfig,
    interfaces: Arc<dyn NetworkInterfaces>,
    default_locator: Option<Arc<dyn Locator>>,
}

impl CommunicatorBuilder {
    /// Source of the addresses wildcard endpoints expand to
    pub fn network_interfaces(mut self, interfaces: Arc<dyn NetworkInterfaces>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Locator installed on every new adapter
    pub fn default_locator(mut self, locator: Arc<dyn Locator>) -> Self {
        self.default_locator = Some(locator);
        self
    }

    pub fn build(self) -> Communicator {
        Communicator {
            factory: Arc::new(AdapterFactory {
                config: self.config,
                interfaces: self.interfaces,
                default_locator: self.default_locator,
                adapters: Mutex::new(Adapters::default()),
            }),
        }
    }
}

/// Handle to the adapter factory; cheap to clone
#[derive(Clone)]
pub struct Communicator {
    factory: Arc<AdapterFactory>,
}

impl Communicator {
    /// Communicator with loopback interfaces and no default locator
    pub fn new(config: PorticoConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: PorticoConfig) -> CommunicatorBuilder {
        CommunicatorBuilder {
            config,
            interfaces: Arc::new(LoopbackInterfaces),
            default_locator: None,
        }
    }

    pub fn config(&self) -> &PorticoConfig {
        &self.factory.config
    }

    /// Create an adapter configured under `name`
    ///
    /// An empty name creates an anonymous adapter with a UUID name and no
    /// configuration.
    pub fn create_object_adapter(&self, name: &str) -> Result<Arc<ObjectAdapter>> {
        self.factory.create(name, None)
    }

    /// Create an adapter listening on `endpoints` instead of the configured
    /// endpoints
    pub fn create_object_adapter_with_endpoints(
        &self,
        name: &str,
        endpoints: &str,
    ) -> Result<Arc<ObjectAdapter>> {
        let endpoints = parse_endpoint_list(endpoints)?;
        self.factory.create(name, Some(endpoints))
    }

    pub fn find_object_adapter(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        self.factory.adapters.lock().by_name.get(name).cloned()
    }

    /// Names of the live adapters, sorted
    pub fn adapter_names(&self) -> Vec<String> {
        self.factory.adapters.lock().by_name.keys().cloned().collect()
    }

    /// Deactivate every adapter and refuse to create new ones
    pub fn shutdown(&self) {
        self.factory.adapters.lock().shut_down = true;
        for adapter in self.factory.snapshot() {
            adapter.deactivate();
        }
        info!("Communicator shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.factory.adapters.lock().shut_down
    }

    /// Block until every adapter is deactivated and idle
    pub fn wait_for_shutdown(&self) {
        for adapter in self.factory.snapshot() {
            adapter.wait_for_deactivate();
        }
    }

    /// Shut down and destroy every adapter
    pub fn destroy(&self) {
        self.shutdown();
        for adapter in self.factory.snapshot() {
            adapter.destroy();
        }
    }
}
