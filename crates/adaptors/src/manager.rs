//! Resolves a route's destination to a registered adaptor.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use beast_core::config::AdaptorConfig;
use beast_core::Route;

use crate::http::HttpAdaptor;
use crate::traits::{Adaptor, AdaptorError};

/// Named adaptors. Route recipients refer to these names.
#[derive(Default)]
pub struct AdaptorManager {
    adaptors: RwLock<HashMap<String, Arc<dyn Adaptor>>>,
}

impl AdaptorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every adaptor declared in the server config.
    pub fn from_config(configs: &HashMap<String, AdaptorConfig>) -> Result<Self, AdaptorError> {
        let manager = Self::new();
        for (name, config) in configs {
            let adaptor: Arc<dyn Adaptor> = match config {
                AdaptorConfig::Http {
                    url,
                    method,
                    timeout_secs,
                    headers,
                } => Arc::new(HttpAdaptor::from_config(
                    url.clone(),
                    method.clone(),
                    headers.clone(),
                    *timeout_secs,
                )?),
            };
            manager.register(name.clone(), adaptor);
        }
        Ok(manager)
    }

    /// Register `adaptor` under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, adaptor: Arc<dyn Adaptor>) {
        let name = name.into();
        tracing::info!(adaptor = %name, kind = adaptor.kind(), "registered adaptor");
        self.adaptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, adaptor);
    }

    /// Remove an adaptor. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.adaptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Registered adaptor names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adaptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Deliver `route` through the adaptor named by its destination.
    ///
    /// The registry lock is released before the adaptor runs, so slow
    /// deliveries never block registration or other deliveries.
    pub async fn handle(&self, route: &Route) -> Result<(), AdaptorError> {
        let adaptor = self
            .adaptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&route.destination)
            .cloned()
            .ok_or_else(|| AdaptorError::NoSuchAdaptor(route.destination.clone()))?;

        let start = Instant::now();
        let result = adaptor.handle(route).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::debug!(
                adaptor = %route.destination,
                kind = route.payload.kind(),
                duration_ms,
                "route delivered"
            ),
            Err(e) => tracing::warn!(
                adaptor = %route.destination,
                kind = route.payload.kind(),
                error = %e,
                duration_ms,
                "route delivery failed"
            ),
        }
        result
    }
}
