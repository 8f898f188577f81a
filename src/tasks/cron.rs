// Argus Host Monitoring Service - Cron Parsing
// Five-field cron expressions mapped onto the cron crate's schedule type

use super::TaskError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Parse a standard five-field cron expression.
///
/// The cron crate wants a leading seconds field; user expressions stay in
/// the classic `minute hour day-of-month month day-of-week` form and get
/// second zero prepended here.
pub fn parse(expression: &str) -> Result<Schedule, TaskError> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(TaskError::InvalidCron(format!(
            "expected 5 fields, got {fields} in {expression:?}"
        )));
    }

    let with_seconds = format!("0 {expression}");
    Schedule::from_str(&with_seconds)
        .map_err(|e| TaskError::InvalidCron(format!("{expression:?}: {e}")))
}

/// Next occurrence strictly after `after`.
pub fn next_run(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, TaskError> {
    let schedule = parse(expression)?;
    Ok(schedule.after(&after).next())
}
