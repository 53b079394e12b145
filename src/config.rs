use crate::error::ConfigError;
use crate::schedule::parse_schedule_time;
use chrono::NaiveTime;
use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Intervals shorter than this hammer registries for no benefit.
pub const MIN_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Seconds between runs; absent or zero means a single run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Daily run time, `HH:MM` in local time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_webhook: Option<String>,
    /// Grace period in seconds before a stopped container is killed.
    pub stop_timeout: u64,
    /// Seconds to wait for a removal the daemon already has in progress.
    pub removal_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: None,
            schedule: None,
            dry_run: false,
            docker_host: None,
            discord_webhook: None,
            stop_timeout: 10,
            removal_timeout: 60,
        }
    }
}

/// Command-line flags; each one overrides the file and environment layers.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "repull", version, about = "Recreate labelled containers when their image changes")]
pub struct Cli {
    /// Run every N seconds (0 = single run)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Run at a specific time daily (HH:MM, e.g. 23:00)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Show what would be updated without making changes
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,

    /// Docker daemon address (default: DOCKER_HOST or the local socket)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,

    /// Discord webhook URL for notifications
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_webhook: Option<String>,
}

/// How often the updater runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Interval(Duration),
    Daily(NaiveTime),
}

impl Config {
    pub fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("repull.toml"))
            .merge(Json::file("repull.json"))
            .merge(Env::prefixed("REPULL_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        Self::figment(cli)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
    }

    pub fn run_mode(&self) -> Result<RunMode, ConfigError> {
        let interval = self.interval.filter(|&secs| secs > 0);
        let schedule = self.schedule.as_deref().filter(|s| !s.is_empty());
        match (interval, schedule) {
            (Some(_), Some(_)) => Err(ConfigError::IntervalAndSchedule),
            (Some(secs), None) if secs < MIN_INTERVAL_SECS => Err(ConfigError::IntervalTooShort {
                min: MIN_INTERVAL_SECS,
                got: secs,
            }),
            (Some(secs), None) => Ok(RunMode::Interval(Duration::from_secs(secs))),
            (None, Some(at)) => Ok(RunMode::Daily(parse_schedule_time(at)?)),
            (None, None) => Ok(RunMode::Once),
        }
    }
}
