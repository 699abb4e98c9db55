//! Configuration error model.
//!
//! Configuration errors describe a process that must not start serving
//! traffic: duplicate registrations, malformed route declarations, missing
//! required settings. They are raised eagerly at bootstrap and never
//! recovered.

use thiserror::Error;

/// Result type used by bootstrap-time operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Fatal bootstrap-time error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A module with the same name is already registered.
    #[error("duplicate module registration: {0}")]
    DuplicateModule(String),

    /// A service with the same name is already registered.
    #[error("duplicate service registration: {0}")]
    DuplicateService(String),

    /// Registration attempted once initialization has started.
    #[error("cannot register {kind} `{name}` after initialization")]
    RegistrationClosed { kind: &'static str, name: String },

    /// `initialize` was called more than once.
    #[error("orchestrator has already been initialized")]
    AlreadyInitialized,

    /// The same method + path was declared twice.
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute { method: String, path: String },

    /// Two routers were mounted under the same prefix.
    #[error("duplicate mount prefix: {0}")]
    DuplicateMount(String),

    /// A route declaration is malformed.
    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    /// Strict pagination parameters were out of range.
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    /// A required setting is absent.
    #[error("missing required configuration: {0}")]
    Missing(String),

    /// A setting is present but unusable.
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid_route(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRoute {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing(key.into())
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
