//! Route registry and message fan-out.
//!
//! A route binds one rule to the adaptors that receive its output. The
//! [`Router`] owns the live rule instances, evaluates them for every inbound
//! message, and expands each result into one [`Route`](beast_core::Route)
//! per recipient. Route definitions persist through a [`RouteStore`].

pub mod definition;
pub mod error;
pub mod router;
pub mod store;

pub use definition::RouteDefinition;
pub use error::{Result, RoutingError, StoreError};
pub use router::Router;
pub use store::{MemoryRouteStore, RouteStore, YamlRouteStore};
