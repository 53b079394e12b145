//! The update engine.
//!
//! One run lists the running containers, keeps the opted-in ones, groups them
//! and walks the groups strictly in order: pull, compare digests, recreate each
//! member, repair containers that shared a replaced member's network namespace.
//! Nothing survives the run; the next one re-derives everything from the daemon.

use crate::error::UpdateError;
use crate::notify::Notifier;
use crate::runtime::RuntimeError;
use crate::types::{short_id, ContainerSnapshot, DigestPair, RecreationMap, UpdateGroup};
use log::{error, info, warn};
use std::collections::VecDeque;

pub mod digest;
pub mod extract;
pub mod group;
pub mod network;
pub mod recreate;
pub mod self_update;

use digest::{image_digest, truncate_digest};
use group::{filter_opted_in, group_by_compose_service};
use network::find_network_dependents;
use recreate::Recreator;
use self_update::{replace_self, Replaced, SelfIdentity, SelfUpdate};

/// Must equal `"true"` for a container to be updated.
pub const ENABLE_LABEL: &str = "io.repull.enable";
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

pub use crate::types::sanitize;

pub(crate) async fn notify_update(
    notifier: &dyn Notifier,
    group: &str,
    image: &str,
    digests: &DigestPair,
) {
    if let Err(e) = notifier
        .send_update(
            &sanitize(group),
            &sanitize(image),
            &sanitize(&digests.old),
            &sanitize(&digests.new),
        )
        .await
    {
        warn!("Failed to send update notification: {}", sanitize(&e.to_string()));
    }
}

pub(crate) async fn notify_error(notifier: &dyn Notifier, group: &str, message: &str) {
    if let Err(e) = notifier
        .send_error(&sanitize(group), &sanitize(message))
        .await
    {
        warn!("Failed to send error notification: {}", sanitize(&e.to_string()));
    }
}

/// What a completed run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Groups whose containers were recreated.
    pub updated: Vec<String>,
    /// Groups whose image digest did not change.
    pub unchanged: Vec<String>,
    /// Groups that would have been recreated, in dry-run mode.
    pub pending: Vec<String>,
    pub recreated: RecreationMap,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// This process's own container was replaced; the process should exit.
    SelfReplaced(Replaced),
}

pub struct Updater<'a> {
    recreator: Recreator<'a>,
    notifier: &'a dyn Notifier,
    identity: &'a SelfIdentity,
    dry_run: bool,
}

impl<'a> Updater<'a> {
    pub fn new(
        recreator: Recreator<'a>,
        notifier: &'a dyn Notifier,
        identity: &'a SelfIdentity,
        dry_run: bool,
    ) -> Self {
        Self {
            recreator,
            notifier,
            identity,
            dry_run,
        }
    }

    /// Performs one full check-and-update pass.
    pub async fn run_once(&self) -> Result<RunOutcome, UpdateError> {
        let running = self.recreator.runtime().list_running().await?;
        info!("Found {} running container(s)", running.len());

        let snapshots: Vec<ContainerSnapshot> = running
            .into_iter()
            .filter_map(ContainerSnapshot::from_inspect)
            .collect();
        let opted_in = filter_opted_in(snapshots);
        info!(
            "Found {} opted-in container(s) (label: {}=true)",
            opted_in.len(),
            ENABLE_LABEL
        );
        if opted_in.is_empty() {
            info!("No containers opted in for auto-update");
            return Ok(RunOutcome::Completed(RunSummary::default()));
        }

        let groups = group_by_compose_service(opted_in);
        info!("Grouped into {} service(s)", groups.len());
        self.update_groups(&groups).await
    }

    /// Updates `groups` one at a time, in order.  The first failing group ends
    /// the run.
    pub async fn update_groups(&self, groups: &[UpdateGroup]) -> Result<RunOutcome, UpdateError> {
        let mut summary = RunSummary::default();

        for group in groups {
            let Some(image) = group.image() else { continue };
            let key = sanitize(&group.key);
            info!("Checking {} ({} container(s))", key, group.containers.len());

            let digests = self.check_digests(&group.key, image).await?;
            if !digests.changed() {
                info!("Image digest unchanged, skipping {}", key);
                summary.unchanged.push(group.key.clone());
                continue;
            }
            info!(
                "Image digest changed: {} -> {}",
                truncate_digest(&digests.old),
                truncate_digest(&digests.new)
            );

            if self.dry_run {
                info!(
                    "[dry-run] Would recreate {} ({} container(s))",
                    key,
                    group.containers.len()
                );
                summary.pending.push(group.key.clone());
                continue;
            }

            info!("Recreating {} container(s)", group.containers.len());
            for member in &group.containers {
                let name = sanitize(&member.name);
                // A network dependent repaired earlier in this run was rebuilt
                // before its own image was pulled, so it goes through again.
                let current = match summary.recreated.latest(&member.id).map(str::to_string) {
                    Some(current_id) => {
                        info!(
                            "{} was recreated earlier in this run, rebuilding on the pulled image",
                            name
                        );
                        self.current_snapshot(&current_id).await?
                    }
                    None => member.clone(),
                };
                let container = &current;

                if self.identity.matches(container) {
                    let update = SelfUpdate {
                        group: &group.key,
                        image,
                        digests: &digests,
                    };
                    return match replace_self(
                        &self.recreator,
                        self.notifier,
                        container,
                        &summary.recreated,
                        update,
                    )
                    .await
                    {
                        Ok(replaced) => Ok(RunOutcome::SelfReplaced(replaced)),
                        Err(e) => {
                            notify_error(self.notifier, &group.key, &e.to_string()).await;
                            Err(e)
                        }
                    };
                }

                info!("Recreating container {}", name);
                match self.recreator.recreate(container, &summary.recreated).await {
                    Ok(new_id) => {
                        if container.id != member.id {
                            summary.recreated.insert(member.id.clone(), new_id.clone());
                        }
                        summary.recreated.insert(container.id.clone(), new_id);
                        info!("Successfully recreated {}", name);
                    }
                    Err(e) => {
                        error!("Failed to recreate container {}: {}", name, sanitize(&e.to_string()));
                        notify_error(self.notifier, &group.key, &e.to_string()).await;
                        return Err(e);
                    }
                }

                self.repair_dependents(container, &mut summary.recreated)
                    .await;
            }

            notify_update(self.notifier, &group.key, image, &digests).await;
            summary.updated.push(group.key.clone());
        }

        Ok(RunOutcome::Completed(summary))
    }

    async fn current_snapshot(&self, id: &str) -> Result<ContainerSnapshot, UpdateError> {
        let inspect = self.recreator.runtime().inspect_container(id).await?;
        ContainerSnapshot::from_inspect(inspect).ok_or_else(|| {
            RuntimeError::Api(format!("inspect of {} returned no id", short_id(id))).into()
        })
    }

    /// Pulls `image` and returns its digests from before and after the pull.
    async fn check_digests(&self, group: &str, image: &str) -> Result<DigestPair, UpdateError> {
        let runtime = self.recreator.runtime();
        let shown = sanitize(image);

        let old = match image_digest(runtime, image).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Failed to get current digest for {}: {}", shown, sanitize(&e.to_string()));
                String::new()
            }
        };

        info!("Pulling image {}", shown);
        if let Err(source) = runtime.pull_image(image).await {
            let err = UpdateError::Pull {
                image: image.to_string(),
                source,
            };
            error!("{}", sanitize(&err.to_string()));
            notify_error(self.notifier, group, &format!("Failed to pull image {}", image)).await;
            return Err(err);
        }

        match image_digest(runtime, image).await {
            Ok(new) => Ok(DigestPair { old, new }),
            Err(source) => {
                error!(
                    "Failed to get new digest for {}: {}",
                    shown,
                    sanitize(&source.to_string())
                );
                notify_error(self.notifier, group, &format!("Failed to get digest for {}", image))
                    .await;
                Err(UpdateError::Digest {
                    image: image.to_string(),
                    source,
                })
            }
        }
    }

    /// Recreates running containers that shared the network namespace of a
    /// replaced one.  They have already lost connectivity, so failures here are
    /// logged and skipped.
    async fn repair_dependents(&self, replaced: &ContainerSnapshot, recreated: &mut RecreationMap) {
        let runtime = self.recreator.runtime();
        let mut queue = VecDeque::from([replaced.clone()]);

        while let Some(old) = queue.pop_front() {
            let dependents = match find_network_dependents(runtime, &old).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        "Failed to find network dependents of {}: {}",
                        sanitize(&old.name),
                        sanitize(&e.to_string())
                    );
                    continue;
                }
            };

            for dep in dependents {
                if recreated.contains(&dep.id) || self.identity.matches(&dep) {
                    continue;
                }
                let name = sanitize(&dep.name);
                info!("Recreating network-dependent container {}", name);
                match self.recreator.recreate(&dep, recreated).await {
                    Ok(new_id) => {
                        recreated.insert(dep.id.clone(), new_id);
                        info!("Successfully recreated network-dependent {}", name);
                        queue.push_back(dep);
                    }
                    Err(e) => warn!(
                        "Failed to recreate network-dependent container {}: {}",
                        name,
                        sanitize(&e.to_string())
                    ),
                }
            }
        }
    }
}
