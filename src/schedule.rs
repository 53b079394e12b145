//! Repeating runs: a fixed interval or once a day at a set local time.

use crate::error::ConfigError;
use crate::updater::self_update::Replaced;
use crate::updater::{sanitize, RunOutcome, Updater};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use log::{error, info};
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Parses `HH:MM` (24h).
pub fn parse_schedule_time(value: &str) -> Result<NaiveTime, ConfigError> {
    let invalid = |reason| ConfigError::InvalidSchedule {
        value: value.to_string(),
        reason,
    };
    let (hour, minute) = value.split_once(':').ok_or_else(|| invalid("invalid format"))?;
    let hour: u32 = hour
        .parse()
        .ok()
        .filter(|h| *h <= 23)
        .ok_or_else(|| invalid("invalid hour"))?;
    let minute: u32 = minute
        .parse()
        .ok()
        .filter(|m| *m <= 59)
        .ok_or_else(|| invalid("invalid minute"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| invalid("invalid time"))
}

/// Today at `target` if that has not passed yet, otherwise tomorrow.
pub fn next_occurrence(now: NaiveDateTime, target: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(target);
    if today < now {
        today + ChronoDuration::days(1)
    } else {
        today
    }
}

/// Runs one pass, logging any failure.  Returns the replacement when this
/// process has been superseded.
async fn run_logged(updater: &Updater<'_>) -> Option<Replaced> {
    match updater.run_once().await {
        Ok(RunOutcome::Completed(_)) => None,
        Ok(RunOutcome::SelfReplaced(replaced)) => Some(replaced),
        Err(e) => {
            error!("Update failed: {}", sanitize(&e.to_string()));
            None
        }
    }
}

/// Runs immediately, then every `every`.  Only returns on self-replacement.
pub async fn run_every(updater: &Updater<'_>, every: Duration) -> Replaced {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Running initial check...");
    loop {
        ticker.tick().await;
        if let Some(replaced) = run_logged(updater).await {
            return replaced;
        }
        info!(
            "Check complete, waiting for next interval ({} seconds)...",
            every.as_secs()
        );
    }
}

/// Runs every day at `at` local time.  Only returns on self-replacement.
pub async fn run_daily(updater: &Updater<'_>, at: NaiveTime) -> Replaced {
    loop {
        let now = Local::now().naive_local();
        let next = next_occurrence(now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            "Next run scheduled at {} (in {}s)",
            next.format("%Y-%m-%d %H:%M:%S"),
            wait.as_secs()
        );
        sleep(wait).await;

        info!("Running scheduled check...");
        if let Some(replaced) = run_logged(updater).await {
            return replaced;
        }
        info!("Check complete");
    }
}
