//! Error types for the portico runtime

use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::servant::Current;
use portico_types::{Identity, ParseError};
use std::fmt;
use thiserror::Error;

/// Boxed application error raised by a servant or servant locator
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What an `AlreadyRegistered` / `NotRegistered` error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    Servant,
    DefaultServant,
    ServantLocator,
    ObjectAdapter,
}

impl fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Servant => "servant",
            Self::DefaultServant => "default servant",
            Self::ServantLocator => "servant locator",
            Self::ObjectAdapter => "object adapter",
        };
        f.write_str(label)
    }
}

/// Errors raised by adapter management operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The key is already taken; the caller must pick another or remove first
    #[error("{kind} `{id}` is already registered")]
    AlreadyRegistered { kind: RegistrationKind, id: String },

    /// Removal of a key that is not registered
    #[error("{kind} `{id}` is not registered")]
    NotRegistered { kind: RegistrationKind, id: String },

    /// The adapter began deactivating
    #[error("object adapter `{0}` is deactivated")]
    Deactivated(String),

    /// Registration or proxy creation with an empty identity name
    #[error("illegal identity `{0}`: the name must not be empty")]
    IllegalIdentity(Identity),

    /// Middleware installed after the first dispatch
    #[error("dispatch pipeline of object adapter `{0}` is already in use")]
    PipelineSealed(String),

    /// The locator registry refused the adapter's endpoints
    #[error("object adapter `{adapter}` could not update the locator registry: {source}")]
    LocatorRegistration {
        adapter: String,
        #[source]
        source: RegistryError,
    },

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] ParseError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AdapterError {
    pub(crate) fn already_registered(kind: RegistrationKind, id: impl fmt::Display) -> Self {
        Self::AlreadyRegistered {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn not_registered(kind: RegistrationKind, id: impl fmt::Display) -> Self {
        Self::NotRegistered {
            kind,
            id: id.to_string(),
        }
    }
}

/// Errors surfaced to the remote caller of a dispatch
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No servant implements any facet of the identity
    #[error("object `{identity}` does not exist (operation `{operation}`)")]
    ObjectNotExist {
        identity: Identity,
        facet: String,
        operation: String,
    },

    /// The identity is known but the requested facet is not
    #[error("facet `{facet}` of object `{identity}` does not exist (operation `{operation}`)")]
    FacetNotExist {
        identity: Identity,
        facet: String,
        operation: String,
    },

    /// The servant does not implement the operation
    #[error("operation `{operation}` does not exist on object `{identity}`")]
    OperationNotExist {
        identity: Identity,
        facet: String,
        operation: String,
    },

    /// The adapter no longer admits requests
    #[error("object adapter `{0}` is deactivated")]
    Deactivated(String),

    /// A servant panicked
    #[error("unknown failure while dispatching `{operation}`: {message}")]
    Unknown { operation: String, message: String },

    /// Application failure, passed through unchanged
    #[error("{0}")]
    User(BoxError),
}

impl DispatchError {
    /// Wrap an application error
    pub fn user(err: impl Into<BoxError>) -> Self {
        Self::User(err.into())
    }

    pub fn object_not_exist(current: &Current) -> Self {
        Self::ObjectNotExist {
            identity: current.id.clone(),
            facet: current.facet.clone(),
            operation: current.operation.clone(),
        }
    }

    pub fn facet_not_exist(current: &Current) -> Self {
        Self::FacetNotExist {
            identity: current.id.clone(),
            facet: current.facet.clone(),
            operation: current.operation.clone(),
        }
    }

    pub fn operation_not_exist(current: &Current) -> Self {
        Self::OperationNotExist {
            identity: current.id.clone(),
            facet: current.facet.clone(),
            operation: current.operation.clone(),
        }
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ObjectNotExist { .. } => "object_not_exist",
            Self::FacetNotExist { .. } => "facet_not_exist",
            Self::OperationNotExist { .. } => "operation_not_exist",
            Self::Deactivated(_) => "adapter_deactivated",
            Self::Unknown { .. } => "unknown",
            Self::User(_) => "user",
        }
    }

    /// Check whether no servant could be found for the request
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::ObjectNotExist { .. } | Self::FacetNotExist { .. })
    }

    /// Downcast a `User` error to a concrete type
    pub fn user_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::User(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Result type using AdapterError
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Result of a dispatched operation: the reply payload or a failure
pub type DispatchResult = std::result::Result<Vec<u8>, DispatchError>;
