//! Servant trait and request context
//!
//! A servant is the local implementation bound to an identity and facet.
//! The adapter never interprets a servant; it only routes requests to it
//! through [`Servant::dispatch`].

use crate::error::{DispatchError, DispatchResult};
use portico_types::Identity;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Per-request context handed to servants, locators and middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
    /// Name of the adapter dispatching the request
    pub adapter: String,
    /// Target identity
    pub id: Identity,
    /// Target facet; empty for the default facet
    pub facet: String,
    /// Operation name
    pub operation: String,
    /// Request id assigned at admission
    pub request_id: u64,
    /// Caller-supplied context entries
    pub context: BTreeMap<String, String>,
}

impl Current {
    /// Create a context for a request addressed to `id`
    pub fn new(adapter: impl Into<String>, id: Identity, operation: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            id,
            facet: String::new(),
            operation: operation.into(),
            request_id: 0,
            context: BTreeMap::new(),
        }
    }

    /// Set the facet
    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = facet.into();
        self
    }
}

impl fmt::Display for Current {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.facet.is_empty() {
            write!(f, " -f {}", self.facet)?;
        }
        write!(f, " {}#{}", self.operation, self.request_id)
    }
}

/// Local implementation of a remote object
///
/// Implementations must be thread-safe: the same servant may be registered
/// under several identities and may run concurrent requests.
///
/// # Example
///
/// ```
/// use portico_core::{Current, DispatchResult, Servant};
///
/// struct Echo;
///
/// impl Servant for Echo {
///     fn dispatch(&self, _current: &Current, payload: &[u8]) -> DispatchResult {
///         Ok(payload.to_vec())
///     }
/// }
/// ```
pub trait Servant: Send + Sync + Any {
    /// Execute `current.operation` with the given payload
    fn dispatch(&self, current: &Current, payload: &[u8]) -> DispatchResult;

    /// Human-readable type name, used in logs
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a servant
pub type ServantRef = Arc<dyn Servant>;

/// Check whether two handles refer to the same servant object
pub fn same_servant(a: &ServantRef, b: &ServantRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// A servant backed by a closure
pub struct FnServant<F> {
    handler: F,
}

impl<F> FnServant<F> {
    pub fn new(handler: F) -> Self
    where
        F: Fn(&Current, &[u8]) -> DispatchResult + Send + Sync + 'static,
    {
        Self { handler }
    }

    /// Wrap the closure into a shareable servant handle
    pub fn shared(handler: F) -> ServantRef
    where
        F: Fn(&Current, &[u8]) -> DispatchResult + Send + Sync + 'static,
    {
        Arc::new(Self::new(handler))
    }
}

impl<F> Servant for FnServant<F>
where
    F: Fn(&Current, &[u8]) -> DispatchResult + Send + Sync + 'static,
{
    fn dispatch(&self, current: &Current, payload: &[u8]) -> DispatchResult {
        (self.handler)(current, payload)
    }
}

type Operation = Box<dyn Fn(&Current, &[u8]) -> DispatchResult + Send + Sync>;

/// A servant dispatching on the operation name
///
/// Unknown operations fail with `OperationNotExist`. Every table answers
/// `ice_ping` with an empty reply unless it registers its own handler.
pub struct OperationTable {
    name: &'static str,
    operations: HashMap<String, Operation>,
}

impl OperationTable {
    /// Create an empty table; `name` shows up as the servant type in logs
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            operations: HashMap::new(),
        }
    }

    /// Register a handler for an operation, replacing any previous one
    pub fn operation<F>(mut self, operation: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Current, &[u8]) -> DispatchResult + Send + Sync + 'static,
    {
        self.operations.insert(operation.into(), Box::new(handler));
        self
    }

    /// Names of the registered operations, sorted
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn into_ref(self) -> ServantRef {
        Arc::new(self)
    }
}

impl Servant for OperationTable {
    fn dispatch(&self, current: &Current, payload: &[u8]) -> DispatchResult {
        match self.operations.get(&current.operation) {
            Some(handler) => handler(current, payload),
            None if current.operation == "ice_ping" => Ok(Vec::new()),
            None => Err(DispatchError::operation_not_exist(current)),
        }
    }

    fn type_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(operation: &str) -> Current {
        Current::new("Test", Identity::new("x"), operation)
    }

    #[test]
    fn test_fn_servant() {
        let servant = FnServant::shared(|current, payload| {
            let mut reply = current.operation.as_bytes().to_vec();
            reply.extend_from_slice(payload);
            Ok(reply)
        });

        let reply = servant.dispatch(&current("op:"), b"data").unwrap();
        assert_eq!(reply, b"op:data");
    }

    #[test]
    fn test_operation_table() {
        let table = OperationTable::new("Greeter")
            .operation("greet", |_, payload| {
                Ok([b"hello ".as_slice(), payload].concat())
            })
            .into_ref();

        assert_eq!(table.type_name(), "Greeter");
        assert_eq!(table.dispatch(&current("greet"), b"bob").unwrap(), b"hello bob");
        assert!(table.dispatch(&current("ice_ping"), b"").unwrap().is_empty());
        assert!(matches!(
            table.dispatch(&current("missing"), b""),
            Err(DispatchError::OperationNotExist { .. })
        ));
    }

    #[test]
    fn test_same_servant() {
        let a: ServantRef = Arc::new(OperationTable::new("A"));
        let b: ServantRef = Arc::new(OperationTable::new("A"));
        assert!(same_servant(&a, &a.clone()));
        assert!(!same_servant(&a, &b));
    }

    #[test]
    fn test_current_display() {
        let mut current = current("greet").with_facet("admin");
        current.request_id = 7;
        assert_eq!(current.to_string(), "x -f admin greet#7");
    }
}
