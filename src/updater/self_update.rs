//! Updating the container this process runs in.
//!
//! The updater cannot stop itself before its replacement exists, so the order is
//! rename, create and start the replacement, notify, then stop the parked old
//! instance through the API with no grace period.  An API stop counts as an
//! operator stop, so an `unless-stopped` restart policy leaves it down.

use super::recreate::{temp_name, Recreator};
use super::{notify_update, sanitize};
use crate::error::UpdateError;
use crate::notify::Notifier;
use crate::types::{short_id, ContainerSnapshot, DigestPair, RecreationMap, SHORT_ID_LEN};
use log::{error, info, warn};

/// Label baked into the updater's own image.
pub const SELF_LABEL: &str = "io.repull.app";

const CGROUP_PATH: &str = "/proc/self/cgroup";

/// Who this process is, worked out once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfIdentity {
    /// Full container id recovered from the cgroup path.
    ContainerId(String),
    /// No id in the cgroup path; the process hostname is all there is.
    Hostname(String),
    /// Not running in a recognisable container.
    Unknown,
}

impl SelfIdentity {
    pub fn detect() -> Self {
        let cgroup = std::fs::read_to_string(CGROUP_PATH).ok();
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::fs::read_to_string("/etc/hostname").ok());
        Self::from_sources(cgroup.as_deref(), hostname.as_deref())
    }

    /// A container id in the cgroup contents always wins over the hostname.
    pub fn from_sources(cgroup: Option<&str>, hostname: Option<&str>) -> Self {
        if let Some(id) = cgroup.and_then(container_id_from_cgroup) {
            return SelfIdentity::ContainerId(id);
        }
        match hostname.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) => SelfIdentity::Hostname(h.to_string()),
            None => SelfIdentity::Unknown,
        }
    }

    /// Whether `container` is this process.
    ///
    /// With a cgroup id only an exact id match counts.  Without one, the daemon's
    /// default hostname (the short id) is tried, then a container carrying the
    /// self label whose configured hostname equals ours.
    pub fn matches(&self, container: &ContainerSnapshot) -> bool {
        match self {
            SelfIdentity::ContainerId(id) => container.id == *id,
            SelfIdentity::Hostname(hostname) => {
                (hostname.len() == SHORT_ID_LEN && container.id.starts_with(hostname.as_str()))
                    || (container.label(SELF_LABEL) == Some("true")
                        && container.configured_hostname() == Some(hostname.as_str()))
            }
            SelfIdentity::Unknown => false,
        }
    }
}

/// Extracts the container id from `/proc/self/cgroup` contents.
///
/// Handles `/docker/<id>` (cgroup v1) and `/system.slice/docker-<id>.scope`
/// (cgroup v2 with the systemd driver).
pub fn container_id_from_cgroup(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let path = line.splitn(3, ':').nth(2)?;
        let segment = path.rsplit('/').next()?;
        let segment = segment.strip_suffix(".scope").unwrap_or(segment);
        let segment = segment.strip_prefix("docker-").unwrap_or(segment);
        is_container_id(segment).then(|| segment.to_string())
    })
}

fn is_container_id(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// The replacement is running and the old instance has been told to stop.  The
/// caller should end the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replaced {
    pub new_id: String,
}

pub struct SelfUpdate<'a> {
    pub group: &'a str,
    pub image: &'a str,
    pub digests: &'a DigestPair,
}

/// Replaces the running updater container `me`.
///
/// On failure to bring up the replacement, `me` is renamed back and the error is
/// returned; the current process keeps running.
pub async fn replace_self(
    recreator: &Recreator<'_>,
    notifier: &dyn Notifier,
    me: &ContainerSnapshot,
    recreated: &RecreationMap,
    update: SelfUpdate<'_>,
) -> Result<Replaced, UpdateError> {
    let runtime = recreator.runtime();
    let name = sanitize(&me.name);
    info!("Self-update detected for {}", name);

    let parked = temp_name(&me.name, &me.id);
    runtime
        .rename_container(&me.id, &parked)
        .await
        .map_err(|source| UpdateError::SelfUpdate {
            container: name.clone(),
            source,
        })?;
    info!("Renamed {} to {}", name, sanitize(&parked));

    let new_id = match recreator.create_and_start(me, &me.name, recreated).await {
        Ok(id) => id,
        Err(source) => {
            error!(
                "Failed to start replacement for {}, rolling back: {}",
                name,
                sanitize(&source.to_string())
            );
            if let Err(e) = runtime.rename_container(&me.id, &me.name).await {
                error!("Rollback: failed to rename {} back: {}", name, sanitize(&e.to_string()));
            }
            return Err(UpdateError::SelfUpdate {
                container: name,
                source,
            });
        }
    };

    info!("Replacement {} started, stopping old instance", short_id(&new_id));
    notify_update(notifier, update.group, update.image, update.digests).await;

    // With no grace period the daemon kills this process here.
    if let Err(e) = runtime.stop_container(&me.id, 0).await {
        warn!("Failed to stop old instance {}: {}", name, sanitize(&e.to_string()));
    }

    Ok(Replaced { new_id })
}
