//! [`CronScheduler`]: holds cron entries and runs the tick loop.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::Notify;
use tracing::{debug, info};

use beast_core::config::JobConfig;
use beast_core::{Message, MessageSink};

use super::cron::{is_cron_due, normalize_cron};
use super::entry::CronEntry;
use super::SchedulerError;

/// Reason carried by every trigger this scheduler publishes.
pub const CRON_REASON: &str = "cron";

pub struct CronScheduler {
    entries: Mutex<BTreeMap<u64, CronEntry>>,
    sink: Arc<dyn MessageSink>,
    shutdown: Notify,
}

impl CronScheduler {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            sink,
            shutdown: Notify::new(),
        }
    }

    /// Build a scheduler with every job from the server config registered.
    pub fn from_jobs(sink: Arc<dyn MessageSink>, jobs: &[JobConfig]) -> Result<Self, SchedulerError> {
        let scheduler = Self::new(sink);
        for job in jobs {
            scheduler.register(job.id, &job.job, &job.cron)?;
        }
        Ok(scheduler)
    }

    /// Add an entry. It first fires at the next scheduled time after now.
    pub fn register(&self, id: u64, job: &str, expression: &str) -> Result<(), SchedulerError> {
        self.register_at(id, job, expression, Utc::now())
    }

    /// Add an entry as if registered at `now`.
    pub fn register_at(
        &self,
        id: u64,
        job: &str,
        expression: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if job.trim().is_empty() {
            return Err(SchedulerError::EmptyJob(id));
        }
        let normalized = normalize_cron(expression);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return Err(SchedulerError::DuplicateId(id));
        }
        entries.insert(
            id,
            CronEntry {
                id,
                job: job.to_string(),
                expression: normalized,
                last_fired: now,
                schedule,
            },
        );
        info!(entry_id = id, job = %job, cron = %expression, "registered cron entry");
        Ok(())
    }

    /// Remove an entry. Returns whether it existed.
    pub fn unregister(&self, id: u64) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            info!(entry_id = id, "unregistered cron entry");
        }
        removed
    }

    /// Snapshot of all entries, ordered by id.
    pub fn entries(&self) -> Vec<CronEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Publish a trigger for every entry due at `now`. Returns the fired job names.
    ///
    /// Several missed ticks of one entry collapse into a single trigger.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<String> {
        let fired: Vec<String> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .values_mut()
                .filter(|entry| is_cron_due(&entry.schedule, now, entry.last_fired))
                .map(|entry| {
                    entry.last_fired = now;
                    entry.job.clone()
                })
                .collect()
        };
        for job in &fired {
            debug!(job = %job, "cron entry due");
            self.sink.manage(Message::trigger(job.clone(), CRON_REASON));
        }
        fired
    }

    /// Tick every `interval` until [`stop`](Self::stop) is called.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?interval, entries = self.entries().len(), "cron scheduler running");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now());
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }
        info!("cron scheduler stopped");
    }

    /// Stop a running [`run`](Self::run) loop. A stop issued before the loop
    /// starts is remembered.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}
