use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;

use crate::definition::RouteDefinition;
use crate::error::StoreError;

use super::RouteStore;

/// In-process store. Used in tests and when no routes directory is configured.
#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    routes: RwLock<IndexMap<String, RouteDefinition>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteStore for MemoryRouteStore {
    fn load(&self, name: &str) -> Result<RouteDefinition, StoreError> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn store(&self, definition: &RouteDefinition) -> Result<(), StoreError> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(&definition.name) {
            return Err(StoreError::AlreadyExists(definition.name.clone()));
        }
        routes.insert(definition.name.clone(), definition.clone());
        Ok(())
    }

    fn update(&self, definition: &RouteDefinition) -> Result<(), StoreError> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        match routes.get_mut(&definition.name) {
            Some(existing) => {
                *existing = definition.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(definition.name.clone())),
        }
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn list(&self) -> Result<Vec<RouteDefinition>, StoreError> {
        let mut all: Vec<RouteDefinition> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
