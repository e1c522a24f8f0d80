//! Shared types for portico
//!
//! This crate provides the value types exchanged between the object adapter
//! runtime and its collaborators: object identities, facet keys, transport
//! endpoints and the proxies an adapter hands back to callers.

mod endpoint;
mod error;
mod identity;
mod proxy;

pub use endpoint::{format_endpoint_list, parse_endpoint_list, Endpoint};
pub use error::ParseError;
pub use identity::{FacetKey, Identity};
pub use proxy::Proxy;
