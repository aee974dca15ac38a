//! Cron-driven trigger source.
//!
//! [`CronScheduler`] keeps a set of [`CronEntry`]s and, on every tick,
//! publishes `Trigger { job, reason: "cron" }` for each entry whose schedule
//! came due since it last fired.

mod core;
mod cron;
mod entry;


pub use self::core::{CronScheduler, CRON_REASON};
pub use self::cron::normalize_cron;
pub use self::entry::CronEntry;

/// Errors returned when registering cron entries.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("cron entry {0} already registered")]
    DuplicateId(u64),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("cron entry {0} has an empty job name")]
    EmptyJob(u64),
}
