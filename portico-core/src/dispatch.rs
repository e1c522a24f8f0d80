//! Request dispatch
//!
//! Resolves the servant of an admitted request and runs the operation. When
//! a servant locator supplied the servant, its `finished` callback runs
//! exactly once after the operation, whatever the operation's outcome.

use crate::error::{DispatchError, DispatchResult};
use crate::locator::{Located, ServantLocatorRef};
use crate::servant::{Current, ServantRef};
use crate::servant_manager::{Resolution, ServantManager};
use portico_types::Identity;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// An inbound request as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub identity: Identity,
    pub facet: String,
    pub operation: String,
    pub payload: Vec<u8>,
    pub context: BTreeMap<String, String>,
}

impl Request {
    pub fn new(identity: Identity, operation: impl Into<String>) -> Self {
        Self {
            identity,
            facet: String::new(),
            operation: operation.into(),
            payload: Vec::new(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = facet.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Split into the per-request context and the payload
    pub(crate) fn into_current(self, adapter: &str) -> (Current, Vec<u8>) {
        let current = Current {
            adapter: adapter.to_string(),
            id: self.identity,
            facet: self.facet,
            operation: self.operation,
            request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            context: self.context,
        };
        (current, self.payload)
    }
}

/// Miss error for `current`, told apart by whether the identity has facets
fn miss(servants: &ServantManager, current: &Current) -> DispatchError {
    if servants.has_servant(&current.id) {
        DispatchError::facet_not_exist(current)
    } else {
        DispatchError::object_not_exist(current)
    }
}

/// Run the operation, turning a servant panic into `Unknown`
fn invoke(servant: &ServantRef, current: &Current, payload: &[u8]) -> DispatchResult {
    catch_unwind(AssertUnwindSafe(|| servant.dispatch(current, payload))).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "servant panicked".to_string());
        Err(DispatchError::Unknown {
            operation: current.operation.clone(),
            message,
        })
    })
}

fn dispatch_located(
    servants: &ServantManager,
    category: &str,
    locator: &ServantLocatorRef,
    current: &Current,
    payload: &[u8],
) -> DispatchResult {
    let located = catch_unwind(AssertUnwindSafe(|| locator.locate(current))).unwrap_or_else(|_| {
        Err(DispatchError::Unknown {
            operation: current.operation.clone(),
            message: "servant locator panicked in locate".to_string(),
        })
    })?;

    let Some(Located { servant, cookie }) = located else {
        debug!(
            adapter = %current.adapter,
            identity = %current.id,
            category,
            "Servant locator found no servant"
        );
        return Err(miss(servants, current));
    };

    let result = invoke(&servant, current, payload);

    let finished = catch_unwind(AssertUnwindSafe(|| locator.finished(current, &servant, cookie)))
        .unwrap_or_else(|_| {
            Err(DispatchError::Unknown {
                operation: current.operation.clone(),
                message: "servant locator panicked in finished".to_string(),
            })
        });

    match finished {
        Ok(()) => result,
        Err(err) => {
            debug!(
                adapter = %current.adapter,
                identity = %current.id,
                category,
                "Servant locator failed in finished: {}",
                err
            );
            Err(err)
        }
    }
}

/// Resolve the servant for `current` and run the operation
pub fn dispatch_to_servant(
    servants: &ServantManager,
    current: &Current,
    payload: &[u8],
) -> DispatchResult {
    match servants.resolve(&current.id, &current.facet) {
        Resolution::Servant(servant) => invoke(&servant, current, payload),
        Resolution::Locator { category, locator } => {
            dispatch_located(servants, &category, &locator, current, payload)
        }
        Resolution::NotFound => Err(miss(servants, current)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{Cookie, ServantLocator};
    use crate::servant::FnServant;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    struct Cookies {
        servant: ServantRef,
        events: Mutex<Vec<String>>,
    }

    impl ServantLocator for Cookies {
        fn locate(&self, current: &Current) -> Result<Option<Located>, DispatchError> {
            self.events.lock().push(format!("locate {}", current.id));
            if current.id.name() == "absent" {
                return Ok(None);
            }
            Ok(Some(Located::with_cookie(self.servant.clone(), current.request_id)))
        }

        fn finished(
            &self,
            _current: &Current,
            _servant: &ServantRef,
            cookie: Option<Cookie>,
        ) -> Result<(), DispatchError> {
            let cookie = cookie.and_then(|c| c.downcast::<u64>().ok());
            self.events.lock().push(format!("finished {:?}", cookie.map(|c| *c)));
            Ok(())
        }
    }

    fn current(identity: Identity, request_id: u64) -> Current {
        let mut current = Current::new("Test", identity, "op");
        current.request_id = request_id;
        current
    }

    #[test]
    fn test_request_ids_are_unique() {
        let (a, _) = Request::new(Identity::new("x"), "op").into_current("Test");
        let (b, _) = Request::new(Identity::new("x"), "op").into_current("Test");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_miss_variants() {
        let servants = ServantManager::new("Test");
        let id = Identity::new("x");

        let err = dispatch_to_servant(&servants, &current(id.clone(), 1), b"").unwrap_err();
        assert!(matches!(err, DispatchError::ObjectNotExist { .. }));

        servants
            .add_servant(FnServant::shared(|_, _| Ok(Vec::new())), &id, "admin")
            .unwrap();
        let err = dispatch_to_servant(&servants, &current(id, 1), b"").unwrap_err();
        assert!(matches!(err, DispatchError::FacetNotExist { .. }));
    }

    #[test]
    fn test_locator_cookie_reaches_finished_on_failure() {
        let servants = ServantManager::new("Test");
        let locator = Arc::new(Cookies {
            servant: FnServant::shared(|_, _| Err(DispatchError::user(Boom))),
            events: Mutex::new(Vec::new()),
        });
        servants.add_servant_locator(locator.clone(), "cat").unwrap();

        let err = dispatch_to_servant(
            &servants,
            &current(Identity::new("n").with_category("cat"), 42),
            b"",
        )
        .unwrap_err();

        assert!(err.user_error::<Boom>().is_some());
        assert_eq!(
            *locator.events.lock(),
            vec!["locate cat/n", "finished Some(42)"]
        );
    }

    #[test]
    fn test_locator_without_servant_skips_finished() {
        let servants = ServantManager::new("Test");
        let locator = Arc::new(Cookies {
            servant: FnServant::shared(|_, _| Ok(Vec::new())),
            events: Mutex::new(Vec::new()),
        });
        servants.add_servant_locator(locator.clone(), "").unwrap();

        let err = dispatch_to_servant(&servants, &current(Identity::new("absent"), 1), b"")
            .unwrap_err();
        assert!(matches!(err, DispatchError::ObjectNotExist { .. }));
        assert_eq!(*locator.events.lock(), vec!["locate absent"]);
    }

    #[test]
    fn test_panicking_servant_reports_unknown() {
        let servants = ServantManager::new("Test");
        let id = Identity::new("x");
        servants
            .add_servant(FnServant::shared(|_, _| panic!("kaput")), &id, "")
            .unwrap();

        let err = dispatch_to_servant(&servants, &current(id, 1), b"").unwrap_err();
        match err {
            DispatchError::Unknown { message, .. } => assert_eq!(message, "kaput"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
