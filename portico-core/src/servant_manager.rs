//! Servant registries of one adapter
//!
//! The servant manager owns the active servant map, the default servants and
//! the servant locators of an adapter. All three tables sit behind a single
//! mutex; lookups and mutations are serialized on it, and it is never held
//! while calling into a servant or a locator. Once closed, the tables
//! refuse new registrations under the same lock, so nothing can be added
//! after the adapter began deactivating.

use crate::error::{AdapterError, RegistrationKind, Result};
use crate::locator::ServantLocatorRef;
use crate::servant::ServantRef;
use parking_lot::{Mutex, MutexGuard};
use portico_types::{FacetKey, Identity};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Servants registered for one identity, keyed by facet
pub type FacetMap = BTreeMap<String, ServantRef>;

/// Outcome of the resolution chain for one request
pub enum Resolution {
    /// A registered servant or default servant
    Servant(ServantRef),
    /// The locator that must be asked
    Locator {
        category: String,
        locator: ServantLocatorRef,
    },
    /// Nothing applies
    NotFound,
}

#[derive(Default)]
struct Tables {
    servants: BTreeMap<Identity, FacetMap>,
    defaults: BTreeMap<String, ServantRef>,
    locators: BTreeMap<String, ServantLocatorRef>,
    closed: bool,
}

/// Active servant map, default servants and servant locators
pub struct ServantManager {
    adapter: String,
    tables: Mutex<Tables>,
}

fn category_label(category: &str) -> &str {
    if category.is_empty() {
        "<any>"
    } else {
        category
    }
}

impl ServantManager {
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Lock the tables for a registration
    fn open_tables(&self) -> Result<MutexGuard<'_, Tables>> {
        let tables = self.tables.lock();
        if tables.closed {
            return Err(AdapterError::Deactivated(self.adapter.clone()));
        }
        Ok(tables)
    }

    /// Refuse every later registration
    pub fn close(&self) {
        self.tables.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.tables.lock().closed
    }

    /// Register a servant under `identity` and `facet`
    pub fn add_servant(&self, servant: ServantRef, identity: &Identity, facet: &str) -> Result<()> {
        let mut tables = self.open_tables()?;
        let facets = tables.servants.entry(identity.clone()).or_default();
        if facets.contains_key(facet) {
            return Err(AdapterError::already_registered(
                RegistrationKind::Servant,
                FacetKey::new(identity.clone(), facet),
            ));
        }

        debug!(
            adapter = %self.adapter,
            identity = %identity,
            facet,
            servant = servant.type_name(),
            "Added servant"
        );
        facets.insert(facet.to_string(), servant);
        Ok(())
    }

    /// Register the default servant for `category`
    pub fn add_default_servant(&self, servant: ServantRef, category: &str) -> Result<()> {
        let mut tables = self.open_tables()?;
        if tables.defaults.contains_key(category) {
            return Err(AdapterError::already_registered(
                RegistrationKind::DefaultServant,
                category_label(category),
            ));
        }

        debug!(
            adapter = %self.adapter,
            category = category_label(category),
            servant = servant.type_name(),
            "Added default servant"
        );
        tables.defaults.insert(category.to_string(), servant);
        Ok(())
    }

    /// Remove the servant registered under `identity` and `facet`
    pub fn remove_servant(&self, identity: &Identity, facet: &str) -> Result<ServantRef> {
        let mut tables = self.tables.lock();
        let not_registered = || {
            AdapterError::not_registered(
                RegistrationKind::Servant,
                FacetKey::new(identity.clone(), facet),
            )
        };

        let facets = tables.servants.get_mut(identity).ok_or_else(not_registered)?;
        let servant = facets.remove(facet).ok_or_else(not_registered)?;
        if facets.is_empty() {
            tables.servants.remove(identity);
        }

        debug!(adapter = %self.adapter, identity = %identity, facet, "Removed servant");
        Ok(servant)
    }

    /// Remove the default servant of `category`
    pub fn remove_default_servant(&self, category: &str) -> Result<ServantRef> {
        let servant = self.tables.lock().defaults.remove(category).ok_or_else(|| {
            AdapterError::not_registered(
                RegistrationKind::DefaultServant,
                category_label(category),
            )
        })?;

        debug!(
            adapter = %self.adapter,
            category = category_label(category),
            "Removed default servant"
        );
        Ok(servant)
    }

    /// Remove every facet of `identity`
    pub fn remove_all_facets(&self, identity: &Identity) -> Result<FacetMap> {
        let facets = self
            .tables
            .lock()
            .servants
            .remove(identity)
            .ok_or_else(|| AdapterError::not_registered(RegistrationKind::Servant, identity))?;

        debug!(
            adapter = %self.adapter,
            identity = %identity,
            count = facets.len(),
            "Removed all facets"
        );
        Ok(facets)
    }

    /// Look up the servant registered under `identity` and `facet`
    pub fn find_servant(&self, identity: &Identity, facet: &str) -> Option<ServantRef> {
        self.tables
            .lock()
            .servants
            .get(identity)
            .and_then(|facets| facets.get(facet))
            .cloned()
    }

    /// Every facet registered for `identity`
    pub fn find_all_facets(&self, identity: &Identity) -> FacetMap {
        self.tables
            .lock()
            .servants
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    /// Check whether any facet is registered for `identity`
    pub fn has_servant(&self, identity: &Identity) -> bool {
        self.tables.lock().servants.contains_key(identity)
    }

    pub fn find_default_servant(&self, category: &str) -> Option<ServantRef> {
        self.tables.lock().defaults.get(category).cloned()
    }

    /// Register the servant locator for `category`
    pub fn add_servant_locator(&self, locator: ServantLocatorRef, category: &str) -> Result<()> {
        let mut tables = self.open_tables()?;
        if tables.locators.contains_key(category) {
            return Err(AdapterError::already_registered(
                RegistrationKind::ServantLocator,
                category_label(category),
            ));
        }

        debug!(
            adapter = %self.adapter,
            category = category_label(category),
            "Added servant locator"
        );
        tables.locators.insert(category.to_string(), locator);
        Ok(())
    }

    /// Remove the servant locator of `category`
    ///
    /// The locator is handed back without being deactivated.
    pub fn remove_servant_locator(&self, category: &str) -> Result<ServantLocatorRef> {
        let locator = self.tables.lock().locators.remove(category).ok_or_else(|| {
            AdapterError::not_registered(
                RegistrationKind::ServantLocator,
                category_label(category),
            )
        })?;

        debug!(
            adapter = %self.adapter,
            category = category_label(category),
            "Removed servant locator"
        );
        Ok(locator)
    }

    pub fn find_servant_locator(&self, category: &str) -> Option<ServantLocatorRef> {
        self.tables.lock().locators.get(category).cloned()
    }

    /// Walk the resolution chain for `identity` and `facet`
    ///
    /// Order: exact registration, default servant of the category, catch-all
    /// default servant, locator of the category, catch-all locator. Only the
    /// first applicable locator is returned.
    pub fn resolve(&self, identity: &Identity, facet: &str) -> Resolution {
        let tables = self.tables.lock();
        let category = identity.category();

        if let Some(servant) = tables.servants.get(identity).and_then(|f| f.get(facet)) {
            return Resolution::Servant(servant.clone());
        }

        let default = tables
            .defaults
            .get(category)
            .or_else(|| tables.defaults.get(""));
        if let Some(servant) = default {
            return Resolution::Servant(servant.clone());
        }

        if let Some(locator) = tables.locators.get(category) {
            return Resolution::Locator {
                category: category.to_string(),
                locator: locator.clone(),
            };
        }
        if let Some(locator) = tables.locators.get("") {
            return Resolution::Locator {
                category: String::new(),
                locator: locator.clone(),
            };
        }

        Resolution::NotFound
    }

    /// Drop every registration and deactivate the locators
    ///
    /// Closes the tables. Locators are deactivated in category order after
    /// the lock is released.
    pub fn destroy(&self) {
        let locators = {
            let mut tables = self.tables.lock();
            tables.closed = true;
            tables.servants.clear();
            tables.defaults.clear();
            std::mem::take(&mut tables.locators)
        };

        for (category, locator) in locators {
            debug!(
                adapter = %self.adapter,
                category = category_label(&category),
                "Deactivating servant locator"
            );
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                locator.deactivate(&category)
            }));
            if outcome.is_err() {
                warn!(
                    adapter = %self.adapter,
                    category = category_label(&category),
                    "Servant locator panicked during deactivation"
                );
            }
        }
    }
}
