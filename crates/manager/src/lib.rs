//! Top-level dispatch for the beast message router.
//!
//! This crate provides:
//! - `MessageManager`: non-blocking intake and a bounded worker pool that
//!   expands messages through the router and delivers them via adaptors
//! - `CronScheduler`: publishes `Trigger` messages on cron schedules
//! - The `beast-server` binary wiring both to config, routes and stdin

pub mod manager;
pub mod scheduler;

pub use manager::{ManagerStats, MessageManager};
pub use scheduler::{CronEntry, CronScheduler, SchedulerError};
