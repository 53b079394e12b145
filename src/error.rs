use crate::runtime::RuntimeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort an update run.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("daemon error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to get digest for {image}: {source}")]
    Digest {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop container {container}: {source}")]
    Stop {
        container: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to rename container {container}: {source}")]
    Rename {
        container: String,
        #[source]
        source: RuntimeError,
    },

    /// Create, network attach or start of the replacement failed.  `restored` tells
    /// whether the old container is back under its own name and running.
    #[error("failed to recreate container {container} (old container restored: {restored}): {source}")]
    Recreate {
        container: String,
        restored: bool,
        #[source]
        source: RuntimeError,
    },

    #[error("self-update of {container} failed: {source}")]
    SelfUpdate {
        container: String,
        #[source]
        source: RuntimeError,
    },

    #[error("container {container} still present {waited:?} after removal was requested")]
    RemovalTimeout { container: String, waited: Duration },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot use interval and schedule together")]
    IntervalAndSchedule,

    #[error("interval must be at least {min} seconds, got {got}")]
    IntervalTooShort { min: u64, got: u64 },

    #[error("invalid schedule {value:?}: {reason} (use HH:MM)")]
    InvalidSchedule { value: String, reason: &'static str },

    #[error(
        "invalid Discord webhook URL: must start with https://discord.com/api/webhooks/ \
         or https://discordapp.com/api/webhooks/"
    )]
    InvalidWebhook,

    #[error("failed to build HTTP client for notifications: {0}")]
    HttpClient(String),
}
