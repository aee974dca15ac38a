//! Cron normalization and due-check helpers.

use chrono::{DateTime, Utc};
use cron::Schedule;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Job configs use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Whether a scheduled time falls in `(last_fired, now]`.
pub(crate) fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, last_fired: DateTime<Utc>) -> bool {
    schedule
        .after(&last_fired)
        .next()
        .is_some_and(|next| next <= now)
}
