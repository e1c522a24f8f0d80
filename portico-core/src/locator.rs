//! Servant locators
//!
//! A servant locator resolves servants on demand, after the active servant
//! map and the default servants came up empty. The adapter consults at most
//! one locator per request: the one registered for the identity's category,
//! or the catch-all locator registered for the empty category.

use crate::error::DispatchError;
use crate::servant::{Current, ServantRef};
use std::any::Any;
use std::sync::Arc;

/// Opaque per-request value passed from `locate` to `finished`
pub type Cookie = Box<dyn Any + Send>;

/// Outcome of a successful `locate`
pub struct Located {
    pub servant: ServantRef,
    pub cookie: Option<Cookie>,
}

impl Located {
    /// A located servant without a cookie
    pub fn new(servant: ServantRef) -> Self {
        Self {
            servant,
            cookie: None,
        }
    }

    /// A located servant carrying a cookie for `finished`
    pub fn with_cookie(servant: ServantRef, cookie: impl Any + Send) -> Self {
        Self {
            servant,
            cookie: Some(Box::new(cookie)),
        }
    }
}

impl std::fmt::Debug for Located {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Located")
            .field("servant", &self.servant.type_name())
            .field("cookie", &self.cookie.is_some())
            .finish()
    }
}

/// Pluggable servant resolution strategy
///
/// The adapter never holds its own lock while calling into a locator, so
/// implementations may block or call out to other services.
pub trait ServantLocator: Send + Sync {
    /// Resolve a servant for the request
    ///
    /// `Ok(None)` means the locator knows no servant for this request; the
    /// dispatch then fails with `ObjectNotExist` or `FacetNotExist` and
    /// `finished` is not called. An error is surfaced to the caller as if the
    /// operation itself had raised it.
    fn locate(&self, current: &Current) -> Result<Option<Located>, DispatchError>;

    /// Called exactly once after the operation on a located servant
    /// completed, successfully or not, with the cookie `locate` returned
    ///
    /// An error returned here replaces the result of the operation.
    fn finished(
        &self,
        current: &Current,
        servant: &ServantRef,
        cookie: Option<Cookie>,
    ) -> Result<(), DispatchError> {
        let _ = (current, servant, cookie);
        Ok(())
    }

    /// Called once when the owning adapter is destroyed
    fn deactivate(&self, category: &str) {
        let _ = category;
    }
}

/// Shared handle to a servant locator
pub type ServantLocatorRef = Arc<dyn ServantLocator>;

/// Check whether two handles refer to the same locator object
pub fn same_locator(a: &ServantLocatorRef, b: &ServantLocatorRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
