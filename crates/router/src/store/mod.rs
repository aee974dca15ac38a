//! Route definition persistence.
//!
//! Stores only hold [`RouteDefinition`]s. Live rule state is never persisted.

mod memory;
mod yaml;

#[cfg(test)]
mod tests;

pub use self::memory::MemoryRouteStore;
pub use self::yaml::YamlRouteStore;

use crate::definition::RouteDefinition;
use crate::error::StoreError;

/// Backend that persists route definitions by name.
pub trait RouteStore: Send + Sync {
    /// Fetch one definition.
    fn load(&self, name: &str) -> Result<RouteDefinition, StoreError>;

    /// Add a new definition. Fails with [`StoreError::AlreadyExists`] on a name clash.
    fn store(&self, definition: &RouteDefinition) -> Result<(), StoreError>;

    /// Replace an existing definition. Fails with [`StoreError::NotFound`] if absent.
    fn update(&self, definition: &RouteDefinition) -> Result<(), StoreError>;

    fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Every stored definition, ordered by name.
    fn list(&self) -> Result<Vec<RouteDefinition>, StoreError>;
}
