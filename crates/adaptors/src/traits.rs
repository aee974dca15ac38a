//! Adaptor trait definition and shared error types.

use beast_core::Route;

/// Errors that can occur during delivery.
#[derive(Debug, thiserror::Error)]
pub enum AdaptorError {
    #[error("no adaptor named '{0}'")]
    NoSuchAdaptor(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend was reached but rejected the payload.
    #[error("delivery via '{adaptor}' failed: {reason}")]
    Delivery { adaptor: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// A delivery backend. One instance per configured adaptor name.
#[async_trait::async_trait]
pub trait Adaptor: Send + Sync {
    /// Deliver one routed payload. Errors mean "delivery failed for this
    /// recipient" and are never retried by the caller.
    async fn handle(&self, route: &Route) -> Result<(), AdaptorError>;

    /// Backend type, e.g. `"http"`.
    fn kind(&self) -> &str;
}
