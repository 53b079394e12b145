//! Swapping a container for an equivalent one running the freshly pulled image.
//!
//! The old container is stopped and renamed rather than removed, so that if the
//! replacement cannot be created, attached or started, the old one is renamed back
//! and restarted.  Removal of the old container happens only once the replacement
//! is running, and is best-effort.

use super::extract::{extract, CreationParams};
use super::network::resolve_network_mode;
use crate::types::sanitize;
use crate::error::UpdateError;
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::types::{short_id, ContainerSnapshot, RecreationMap};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const DEFAULT_STOP_GRACE_SECS: i64 = 10;
pub const DEFAULT_REMOVAL_DEADLINE: Duration = Duration::from_secs(60);
const REMOVAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Name the old container is parked under while its replacement is created.
pub fn temp_name(name: &str, id: &str) -> String {
    format!("{}-old-{}", name, short_id(id))
}

pub struct Recreator<'a> {
    runtime: &'a dyn ContainerRuntime,
    stop_grace_secs: i64,
    removal_deadline: Duration,
}

impl<'a> Recreator<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self {
            runtime,
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
            removal_deadline: DEFAULT_REMOVAL_DEADLINE,
        }
    }

    pub fn with_stop_grace(mut self, secs: i64) -> Self {
        self.stop_grace_secs = secs;
        self
    }

    pub fn with_removal_deadline(mut self, deadline: Duration) -> Self {
        self.removal_deadline = deadline;
        self
    }

    pub fn runtime(&self) -> &'a dyn ContainerRuntime {
        self.runtime
    }

    /// Replaces `old` with a new container of the same name and configuration.
    /// Returns the new container id.
    ///
    /// The image must already be pulled.
    pub async fn recreate(
        &self,
        old: &ContainerSnapshot,
        recreated: &RecreationMap,
    ) -> Result<String, UpdateError> {
        let name = sanitize(&old.name);

        info!("Stopping {} (grace {}s)", name, self.stop_grace_secs);
        self.runtime
            .stop_container(&old.id, self.stop_grace_secs)
            .await
            .map_err(|source| UpdateError::Stop {
                container: name.clone(),
                source,
            })?;

        let parked = temp_name(&old.name, &old.id);
        if let Err(source) = self.runtime.rename_container(&old.id, &parked).await {
            // Name is unchanged, so restarting is the whole rollback.
            if let Err(e) = self.runtime.start_container(&old.id).await {
                error!(
                    "Failed to restart {} after rename failure: {}",
                    name,
                    sanitize(&e.to_string())
                );
            }
            return Err(UpdateError::Rename {
                container: name,
                source,
            });
        }
        debug!("Renamed {} to {}", name, sanitize(&parked));

        let new_id = match self.create_and_start(old, &old.name, recreated).await {
            Ok(id) => id,
            Err(source) => {
                error!(
                    "Failed to create replacement for {}, rolling back: {}",
                    name,
                    sanitize(&source.to_string())
                );
                let restored = self.rollback(old).await;
                return Err(UpdateError::Recreate {
                    container: name,
                    restored,
                    source,
                });
            }
        };

        if let Err(e) = self.remove_old(old).await {
            warn!(
                "Failed to remove old container {}: {}",
                sanitize(&parked),
                sanitize(&e.to_string())
            );
        }

        Ok(new_id)
    }

    /// Creates `name` from `old`'s configuration, attaches its extra networks and
    /// starts it.  A partially created container is force-removed on failure.
    pub async fn create_and_start(
        &self,
        old: &ContainerSnapshot,
        name: &str,
        recreated: &RecreationMap,
    ) -> Result<String, RuntimeError> {
        let mut params = extract(old);
        if let Some(mode) = params.network_mode().map(str::to_string) {
            let resolved = resolve_network_mode(self.runtime, &mode, recreated).await;
            if resolved != mode {
                info!("Network mode of {} resolved to {}", sanitize(name), sanitize(&resolved));
            }
            params.set_network_mode(Some(resolved));
        }
        let CreationParams {
            config,
            additional_networks,
        } = params;

        let new_id = self.runtime.create_container(name, config).await?;

        for (network, endpoint) in additional_networks {
            if let Err(e) = self.runtime.connect_network(&network, &new_id, endpoint).await {
                self.discard(&new_id).await;
                return Err(e);
            }
        }

        if let Err(e) = self.runtime.start_container(&new_id).await {
            self.discard(&new_id).await;
            return Err(e);
        }

        Ok(new_id)
    }

    async fn discard(&self, id: &str) {
        if let Err(e) = self.runtime.remove_container(id, true).await {
            warn!(
                "Failed to remove partially created container {}: {}",
                short_id(id),
                sanitize(&e.to_string())
            );
        }
    }

    /// Puts `old` back under its own name and starts it.  Returns whether both
    /// steps succeeded.
    async fn rollback(&self, old: &ContainerSnapshot) -> bool {
        let name = sanitize(&old.name);
        let mut restored = true;
        if let Err(e) = self.runtime.rename_container(&old.id, &old.name).await {
            error!("Rollback: failed to rename {} back: {}", name, sanitize(&e.to_string()));
            restored = false;
        }
        if let Err(e) = self.runtime.start_container(&old.id).await {
            error!("Rollback: failed to restart {}: {}", name, sanitize(&e.to_string()));
            restored = false;
        }
        if restored {
            info!("Rolled back {}", name);
        }
        restored
    }

    /// Removes the parked old container, tolerating a removal the daemon already
    /// has in progress.
    async fn remove_old(&self, old: &ContainerSnapshot) -> Result<(), UpdateError> {
        match self.runtime.remove_container(&old.id, false).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(RuntimeError::Conflict(msg)) => {
                debug!(
                    "Removal of {} already in progress: {}",
                    short_id(&old.id),
                    sanitize(&msg)
                );
                self.wait_for_removal(old).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_for_removal(&self, old: &ContainerSnapshot) -> Result<(), UpdateError> {
        let started = Instant::now();
        loop {
            match self.runtime.inspect_container(&old.id).await {
                Err(RuntimeError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
                Ok(_) => {}
            }
            if started.elapsed() >= self.removal_deadline {
                return Err(UpdateError::RemovalTimeout {
                    container: temp_name(&old.name, &old.id),
                    waited: self.removal_deadline,
                });
            }
            sleep(REMOVAL_POLL_INTERVAL).await;
        }
    }
}
