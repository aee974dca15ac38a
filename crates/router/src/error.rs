//! Routing and persistence errors.

use beast_rules::RuleError;

/// Errors returned by route registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("route '{0}' already exists")]
    RouteExists(String),

    #[error("no route named '{0}'")]
    NoSuchRoute(String),

    /// The definition itself is malformed (name, recipients).
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// The route's rule could not be built.
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for router operations.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors raised by [`RouteStore`](crate::RouteStore) backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("route '{0}' not found in store")]
    NotFound(String),

    #[error("route '{0}' already stored")]
    AlreadyExists(String),
}
