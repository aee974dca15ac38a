//! Delivery backends for routed messages.
//!
//! This crate provides:
//! - `Adaptor` trait for pluggable delivery backends
//! - `AdaptorManager` that resolves a route's destination to an adaptor
//! - `HttpAdaptor` posting JSON payloads to an HTTP endpoint

pub mod http;
pub mod manager;
pub mod traits;

pub use http::HttpAdaptor;
pub use manager::AdaptorManager;
pub use traits::{Adaptor, AdaptorError};
