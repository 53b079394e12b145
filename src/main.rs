//! Repull entry point.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{debug, error, info};
use tokio::signal;

mod config;
mod error;
mod notify;
mod runtime;
mod schedule;
mod types;
mod updater;

use config::{Cli, Config, RunMode};
use notify::{DiscordNotifier, Notifier, NullNotifier};
use runtime::DockerRuntime;
use types::short_id;
use updater::recreate::Recreator;
use updater::self_update::SelfIdentity;
use updater::{sanitize, RunOutcome, Updater};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    let mode = cfg.run_mode()?;
    info!("Repull starting...");

    let runtime = DockerRuntime::connect(cfg.docker_host.as_deref())
        .await
        .context("failed to connect to Docker daemon")?;

    let notifier: Box<dyn Notifier> = match cfg.discord_webhook.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            let discord = DiscordNotifier::new(url)?;
            info!("Discord notifications enabled");
            Box::new(discord)
        }
        None => Box::new(NullNotifier),
    };

    if cfg.dry_run {
        info!("Running in DRY-RUN mode - no changes will be made");
    }

    let identity = SelfIdentity::detect();
    debug!("Self identity: {:?}", identity);

    let recreator = Recreator::new(&runtime)
        .with_stop_grace(cfg.stop_timeout as i64)
        .with_removal_deadline(Duration::from_secs(cfg.removal_timeout));
    let updater = Updater::new(recreator, notifier.as_ref(), &identity, cfg.dry_run);

    let replaced = match mode {
        RunMode::Once => {
            info!("Running in single-run mode");
            match updater.run_once().await {
                Ok(RunOutcome::Completed(summary)) => {
                    info!(
                        "Update complete: {} updated, {} unchanged, {} pending, {} container(s) recreated",
                        summary.updated.len(),
                        summary.unchanged.len(),
                        summary.pending.len(),
                        summary.recreated.len()
                    );
                    return Ok(());
                }
                Ok(RunOutcome::SelfReplaced(replaced)) => replaced,
                Err(e) => {
                    error!("Update failed: {}", sanitize(&e.to_string()));
                    return Err(e.into());
                }
            }
        }
        RunMode::Interval(every) => {
            info!("Running in loop mode (interval: {} seconds)", every.as_secs());
            tokio::select! {
                replaced = schedule::run_every(&updater, every) => replaced,
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    return Ok(());
                }
            }
        }
        RunMode::Daily(at) => {
            info!("Running in schedule mode (daily at {})", at.format("%H:%M"));
            tokio::select! {
                replaced = schedule::run_daily(&updater, at) => replaced,
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    return Ok(());
                }
            }
        }
    };

    // Normally the stop issued during self-update has already killed us.
    info!("Replaced by {}, exiting", short_id(&replaced.new_id));
    std::process::exit(0);
}
