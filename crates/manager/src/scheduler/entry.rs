use chrono::{DateTime, Utc};
use cron::Schedule;

/// One scheduled trigger.
#[derive(Debug, Clone)]
pub struct CronEntry {
    pub id: u64,
    /// Route name the trigger is addressed to.
    pub job: String,
    /// Normalized 6-field expression.
    pub expression: String,
    /// Last time this entry fired, or when it was registered.
    pub last_fired: DateTime<Utc>,
    pub(crate) schedule: Schedule,
}

impl CronEntry {
    /// Next time this entry will fire.
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.schedule.after(&self.last_fired).next()
    }
}
