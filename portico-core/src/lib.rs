//! Portico - object adapter runtime
//!
//! This crate provides the dispatch endpoint of an RPC server runtime: the
//! object adapter. An adapter maps incoming `(identity, facet, operation)`
//! requests to servants, builds the proxies it hands back to callers, and
//! gates all dispatch behind a strict activation lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Communicator                          │
//! │   (owns adapters by name, configuration, default locator)    │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                    ObjectAdapter                       │  │
//! │  │                                                        │  │
//! │  │   Lifecycle gate ──► Middleware ──► Dispatch resolver  │  │
//! │  │                                         │              │  │
//! │  │        ┌──────────────┬─────────────────┤              │  │
//! │  │        ▼              ▼                 ▼              │  │
//! │  │  Active servant   Default          Servant             │  │
//! │  │       map         servants         locators            │  │
//! │  │                                                        │  │
//! │  │   Proxy factory ◄── published endpoints, adapter id    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Resolution order
//!
//! For a request addressed to `identity` and `facet` the adapter tries, and
//! stops at the first match:
//!
//! 1. the servant registered for exactly `(identity, facet)`
//! 2. the default servant of `identity.category`
//! 3. the catch-all default servant (empty category)
//! 4. the servant locator of `identity.category`, or the catch-all locator
//!    when that category has none
//!
//! When nothing matches the request fails with `FacetNotExist` if the
//! identity has other facets registered, and with `ObjectNotExist`
//! otherwise.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──► Activating ──► Active ◄──► Holding
//!    │                                      │
//!    └──────────────► Deactivating ◄────────┘
//!                          │
//!                     Deactivated ──► Destroyed
//! ```
//!
//! Requests block while the adapter is created or held and fail once
//! deactivation has begun.
//!
//! # Example
//!
//! ```rust
//! use portico_core::{Communicator, FnServant, PorticoConfig, Request};
//! use portico_types::Identity;
//!
//! let communicator = Communicator::new(PorticoConfig::default());
//! let adapter = communicator.create_object_adapter("Hello").unwrap();
//!
//! let echo = FnServant::shared(|_current, payload| Ok(payload.to_vec()));
//! adapter.add(echo, &Identity::new("hello")).unwrap();
//! adapter.activate().unwrap();
//!
//! let reply = adapter
//!     .dispatch(Request::new(Identity::new("hello"), "echo").with_payload("hi"))
//!     .unwrap();
//! assert_eq!(reply, b"hi");
//!
//! adapter.destroy();
//! ```

pub mod adapter;
pub mod communicator;
pub mod config;
pub mod dispatch;
pub mod endpoints;
pub mod error;
pub mod lifecycle;
pub mod locator;
pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod servant;
pub mod servant_manager;

// Re-exports for convenience
pub use adapter::ObjectAdapter;
pub use communicator::{Communicator, CommunicatorBuilder};
pub use config::{AdapterProperties, ConfigError, PorticoConfig};
pub use dispatch::Request;
pub use endpoints::{LoopbackInterfaces, NetworkInterfaces, StaticInterfaces};
pub use error::{
    AdapterError, BoxError, DispatchError, DispatchResult, RegistrationKind, Result,
};
pub use lifecycle::AdapterState;
pub use locator::{Cookie, Located, ServantLocator, ServantLocatorRef};
pub use middleware::{LoggingMiddleware, Middleware, Next};
pub use registry::{InMemoryLocator, InMemoryRegistry, Locator, LocatorRegistry, RegistryError};
pub use servant::{same_servant, Current, FnServant, OperationTable, Servant, ServantRef};
pub use servant_manager::FacetMap;
