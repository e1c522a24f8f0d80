//! Object adapters
//!
//! An object adapter maps incoming requests to servants. It combines the
//! servant manager, the lifecycle gate, the proxy factory and the dispatch
//! pipeline, and keeps a weak handle on the factory that created it so that
//! destroying the adapter frees its name.

use crate::communicator::AdapterFactory;
use crate::config::AdapterProperties;
use crate::dispatch::{dispatch_to_servant, Request};
use crate::endpoints::{compute_published_endpoints, NetworkInterfaces};
use crate::error::{AdapterError, DispatchResult, Result};
use crate::lifecycle::{Activation, AdapterState, Lifecycle};
use crate::locator::ServantLocatorRef;
use crate::middleware::{Middleware, Pipeline};
use crate::proxy::ProxyFactory;
use crate::registry::{registration_identity, Locator};
use crate::servant::{Current, ServantRef};
use crate::servant_manager::{FacetMap, ServantManager};
use parking_lot::RwLock;
use portico_types::{Endpoint, Identity, Proxy};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything an adapter needs from its owner at construction
pub(crate) struct AdapterInit {
    pub name: String,
    pub properties: AdapterProperties,
    pub endpoints: Option<Vec<Endpoint>>,
    pub interfaces: Arc<dyn NetworkInterfaces>,
    pub locator: Option<Arc<dyn Locator>>,
    pub owner: Weak<AdapterFactory>,
}

/// Dispatch endpoint of the server runtime
pub struct ObjectAdapter {
    name: String,
    owner: Weak<AdapterFactory>,
    properties: AdapterProperties,
    endpoints: Vec<Endpoint>,
    interfaces: Arc<dyn NetworkInterfaces>,
    servants: ServantManager,
    lifecycle: Lifecycle,
    proxies: ProxyFactory,
    locator: RwLock<Option<Arc<dyn Locator>>>,
    pipeline: Pipeline,
}

fn check_identity(identity: &Identity) -> Result<()> {
    if identity.is_valid() {
        Ok(())
    } else {
        Err(AdapterError::IllegalIdentity(identity.clone()))
    }
}

impl ObjectAdapter {
    pub(crate) fn new(init: AdapterInit) -> Result<Self> {
        let AdapterInit {
            name,
            properties,
            endpoints,
            interfaces,
            locator,
            owner,
        } = init;

        properties.validate(&name)?;
        let endpoints = match endpoints {
            Some(endpoints) => endpoints,
            None => properties.parsed_endpoints()?,
        };
        let published = compute_published_endpoints(&properties, &endpoints, interfaces.as_ref())?;

        let proxies = ProxyFactory::new(
            properties.adapter_id().map(str::to_string),
            properties.replica_group_id().map(str::to_string),
            published,
        );

        Ok(Self {
            servants: ServantManager::new(name.clone()),
            lifecycle: Lifecycle::new(name.clone()),
            name,
            owner,
            properties,
            endpoints,
            interfaces,
            proxies,
            locator: RwLock::new(locator),
            pipeline: Pipeline::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    pub fn adapter_id(&self) -> Option<&str> {
        self.proxies.adapter_id()
    }

    pub fn replica_group_id(&self) -> Option<&str> {
        self.proxies.replica_group_id()
    }

    // Lifecycle

    /// Start dispatching requests
    ///
    /// The first activation registers the adapter with the locator registry
    /// when an adapter id and a locator are configured; if the registry
    /// refuses, the adapter goes back to its previous state.
    pub fn activate(&self) -> Result<()> {
        match self.lifecycle.begin_activate()? {
            Activation::AlreadyActive => Ok(()),
            Activation::Resumed => {
                debug!(adapter = %self.name, "Object adapter resumed");
                Ok(())
            }
            Activation::First => {
                let registered = self.update_locator_registry(Some(self.registration_proxy()));
                self.lifecycle.finish_activate(registered.is_ok());
                registered?;
                info!(adapter = %self.name, "Object adapter activated");
                Ok(())
            }
        }
    }

    /// Stop admitting new requests; requests already running continue
    pub fn hold(&self) -> Result<()> {
        self.lifecycle.hold()?;
        debug!(adapter = %self.name, "Object adapter holding");
        Ok(())
    }

    /// Block until the adapter is held and no dispatch is in flight
    pub fn wait_for_hold(&self) {
        self.lifecycle.wait_for_hold();
    }

    /// Stop admitting requests for good
    ///
    /// Requests already admitted may still complete; use
    /// [`wait_for_deactivate`](Self::wait_for_deactivate) to wait for them.
    /// Calling this again is a no-op.
    pub fn deactivate(&self) {
        if !self.lifecycle.begin_deactivate() {
            return;
        }
        self.servants.close();

        if self.lifecycle.has_activated() {
            if let Err(err) = self.update_locator_registry(None) {
                warn!(adapter = %self.name, "Failed to unregister object adapter: {}", err);
            }
        }

        self.lifecycle.finish_deactivate();
        info!(adapter = %self.name, "Object adapter deactivated");
    }

    /// Block until the adapter is deactivated and every dispatch completed
    pub fn wait_for_deactivate(&self) {
        self.lifecycle.wait_for_deactivate();
    }

    pub fn is_deactivated(&self) -> bool {
        self.lifecycle.is_deactivated()
    }

    /// Deactivate the adapter, wait for it and drop every registration
    ///
    /// Servant locators are told to deactivate first. The adapter name
    /// becomes available again in its communicator. Must not be called from
    /// a dispatch of this adapter, which would wait for itself.
    pub fn destroy(&self) {
        self.deactivate();
        self.wait_for_deactivate();

        if !self.lifecycle.begin_destroy() {
            return;
        }

        self.servants.destroy();
        if let Some(owner) = self.owner.upgrade() {
            owner.remove_adapter(&self.name);
        }
        self.lifecycle.finish_destroy();
        info!(adapter = %self.name, "Object adapter destroyed");
    }

    // Active servant map

    pub fn add(&self, servant: ServantRef, identity: &Identity) -> Result<Proxy> {
        self.add_facet(servant, identity, "")
    }

    /// Register a servant for one facet and return its proxy
    pub fn add_facet(&self, servant: ServantRef, identity: &Identity, facet: &str) -> Result<Proxy> {
        self.lifecycle.check_not_deactivated()?;
        check_identity(identity)?;
        self.servants.add_servant(servant, identity, facet)?;
        Ok(self.proxies.create_proxy(identity.clone(), facet))
    }

    /// Register a servant under a fresh UUID identity
    pub fn add_with_uuid(&self, servant: ServantRef) -> Result<Proxy> {
        self.add_facet_with_uuid(servant, "")
    }

    pub fn add_facet_with_uuid(&self, servant: ServantRef, facet: &str) -> Result<Proxy> {
        let identity = Identity::new(Uuid::new_v4().to_string());
        self.add_facet(servant, &identity, facet)
    }

    pub fn add_default_servant(&self, servant: ServantRef, category: &str) -> Result<()> {
        self.lifecycle.check_not_deactivated()?;
        self.servants.add_default_servant(servant, category)
    }

    pub fn remove(&self, identity: &Identity) -> Result<ServantRef> {
        self.remove_facet(identity, "")
    }

    pub fn remove_facet(&self, identity: &Identity, facet: &str) -> Result<ServantRef> {
        self.lifecycle.check_not_deactivated()?;
        check_identity(identity)?;
        self.servants.remove_servant(identity, facet)
    }

    /// Remove every facet of `identity`, returning them by facet name
    pub fn remove_all_facets(&self, identity: &Identity) -> Result<FacetMap> {
        self.lifecycle.check_not_deactivated()?;
        check_identity(identity)?;
        self.servants.remove_all_facets(identity)
    }

    pub fn remove_default_servant(&self, category: &str) -> Result<ServantRef> {
        self.lifecycle.check_not_deactivated()?;
        self.servants.remove_default_servant(category)
    }

    /// Look up the servant of the default facet
    ///
    /// Lookups only read the active servant map; default servants and
    /// locators are never consulted.
    pub fn find(&self, identity: &Identity) -> Option<ServantRef> {
        self.find_facet(identity, "")
    }

    pub fn find_facet(&self, identity: &Identity, facet: &str) -> Option<ServantRef> {
        self.servants.find_servant(identity, facet)
    }

    pub fn find_all_facets(&self, identity: &Identity) -> FacetMap {
        self.servants.find_all_facets(identity)
    }

    /// Look up the servant a proxy addresses, if the proxy is local to this
    /// adapter
    pub fn find_by_proxy(&self, proxy: &Proxy) -> Option<ServantRef> {
        if !self.is_local(proxy) {
            return None;
        }
        self.find_facet(&proxy.identity, &proxy.facet)
    }

    pub fn find_default_servant(&self, category: &str) -> Option<ServantRef> {
        self.servants.find_default_servant(category)
    }

    /// A proxy is local when it names this adapter, points at one of its
    /// endpoints, or is a well-known proxy
    fn is_local(&self, proxy: &Proxy) -> bool {
        let ours = [self.adapter_id(), self.replica_group_id()];
        let theirs = [proxy.adapter_id.as_deref(), proxy.replica_group_id.as_deref()];
        if theirs.iter().flatten().any(|id| ours.contains(&Some(*id))) {
            return true;
        }

        if proxy.is_direct() {
            let published = self.published_endpoints();
            return proxy.endpoints.iter().any(|endpoint| {
                self.endpoints
                    .iter()
                    .chain(published.iter())
                    .any(|own| own.same_address(endpoint))
            });
        }

        proxy.is_well_known()
    }

    // Servant locators

    pub fn add_servant_locator(&self, locator: ServantLocatorRef, category: &str) -> Result<()> {
        self.lifecycle.check_not_deactivated()?;
        self.servants.add_servant_locator(locator, category)
    }

    /// Remove the locator of `category`; it is not deactivated
    pub fn remove_servant_locator(&self, category: &str) -> Result<ServantLocatorRef> {
        self.lifecycle.check_not_deactivated()?;
        self.servants.remove_servant_locator(category)
    }

    pub fn find_servant_locator(&self, category: &str) -> Option<ServantLocatorRef> {
        self.servants.find_servant_locator(category)
    }

    // Proxies

    /// Proxy for `identity` following the adapter id configuration
    pub fn create_proxy(&self, identity: &Identity) -> Result<Proxy> {
        self.lifecycle.check_not_deactivated()?;
        check_identity(identity)?;
        Ok(self.proxies.create_proxy(identity.clone(), ""))
    }

    /// Proxy for `identity` embedding the published endpoints
    pub fn create_direct_proxy(&self, identity: &Identity) -> Result<Proxy> {
        self.lifecycle.check_not_deactivated()?;
        check_identity(identity)?;
        Ok(self.proxies.create_direct_proxy(identity.clone(), ""))
    }

    /// Proxy for `identity` naming the adapter id, if any
    pub fn create_indirect_proxy(&self, identity: &Identity) -> Result<Proxy> {
        self.lifecycle.check_not_deactivated()?;
        check_identity(identity)?;
        Ok(self.proxies.create_indirect_proxy(identity.clone(), ""))
    }

    // Locator

    /// Replace the locator used for registration; `None` clears it
    pub fn set_locator(&self, locator: Option<Arc<dyn Locator>>) -> Result<()> {
        self.lifecycle.check_not_deactivated()?;
        *self.locator.write() = locator;
        Ok(())
    }

    pub fn locator(&self) -> Option<Arc<dyn Locator>> {
        self.locator.read().clone()
    }

    // Endpoints

    /// Listening endpoints
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.clone()
    }

    /// Endpoints embedded in direct proxies
    pub fn published_endpoints(&self) -> Vec<Endpoint> {
        self.proxies.published_endpoints()
    }

    /// Replace the published endpoints
    ///
    /// Proxies created earlier keep their endpoints. An activated adapter
    /// re-registers with the locator registry; if that fails the previous
    /// endpoints are restored.
    pub fn set_published_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<()> {
        self.lifecycle.check_not_deactivated()?;
        let previous = self.proxies.set_published_endpoints(endpoints);

        if self.lifecycle.has_activated() {
            if let Err(err) = self.update_locator_registry(Some(self.registration_proxy())) {
                self.proxies.set_published_endpoints(previous);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Recompute the published endpoints from configuration and the local
    /// network interfaces
    pub fn refresh_published_endpoints(&self) -> Result<()> {
        self.lifecycle.check_not_deactivated()?;
        let published = compute_published_endpoints(
            &self.properties,
            &self.endpoints,
            self.interfaces.as_ref(),
        )?;
        debug!(adapter = %self.name, count = published.len(), "Refreshed published endpoints");
        self.set_published_endpoints(published)
    }

    fn registration_proxy(&self) -> Proxy {
        Proxy::direct(registration_identity(), self.published_endpoints())
    }

    /// Register (`Some`) or unregister (`None`) with the locator registry
    fn update_locator_registry(&self, proxy: Option<Proxy>) -> Result<()> {
        let Some(adapter_id) = self.adapter_id() else {
            return Ok(());
        };
        let Some(registry) = self.locator().and_then(|locator| locator.registry()) else {
            return Ok(());
        };

        let registering = proxy.is_some();
        let outcome = match self.replica_group_id() {
            Some(group) => registry.set_replicated_adapter_direct_proxy(adapter_id, group, proxy),
            None => registry.set_adapter_direct_proxy(adapter_id, proxy),
        };
        outcome.map_err(|source| AdapterError::LocatorRegistration {
            adapter: self.name.clone(),
            source,
        })?;

        if registering {
            debug!(adapter = %self.name, adapter_id, "Registered with locator registry");
        } else {
            debug!(adapter = %self.name, adapter_id, "Unregistered from locator registry");
        }
        Ok(())
    }

    // Dispatch

    /// Install a middleware around every dispatch
    ///
    /// The first middleware installed runs outermost. Fails once the
    /// adapter dispatched its first request.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.lifecycle.check_not_deactivated()?;
        if self.pipeline.install(middleware) {
            Ok(())
        } else {
            Err(AdapterError::PipelineSealed(self.name.clone()))
        }
    }

    /// Dispatch one request
    ///
    /// Blocks while the adapter is not yet active or is held, and fails with
    /// `Deactivated` once deactivation has begun.
    pub fn dispatch(&self, request: Request) -> DispatchResult {
        let _admitted = self.lifecycle.admit()?;
        let (current, payload) = request.into_current(&self.name);
        self.pipeline.run(
            &current,
            &payload,
            &|current: &Current, payload: &[u8]| dispatch_to_servant(&self.servants, current, payload),
        )
    }
}

impl fmt::Debug for ObjectAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAdapter")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("adapter_id", &self.adapter_id())
            .field("replica_group_id", &self.replica_group_id())
            .finish()
    }
}
