//! [`Router`]: live route registry and per-message fan-out.

mod core;


pub use self::core::Router;
