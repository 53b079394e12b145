//! Data structures shared by the update engine.
//!
//! A [`ContainerSnapshot`] is a point-in-time copy of what the daemon reported for
//! one container.  Snapshots are never mutated; once a container is recreated its
//! snapshot is simply stale and the next run reads a fresh one.  The
//! [`RecreationMap`] is the only state carried between recreations, and it lives
//! no longer than a single run.

use bollard::models::ContainerInspectResponse;
use std::collections::BTreeMap;

/// Length of the abbreviated container id the daemon prints.
pub const SHORT_ID_LEN: usize = 12;

/// Replaces control characters so names from containers and registries cannot
/// forge log lines or notification layout.
pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { '·' } else { c })
        .collect()
}

/// Returns the first 12 characters of `id`, or `id` itself if shorter.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSnapshot {
    pub id: String,
    /// Name without the daemon's leading `/`; the short id when unnamed.
    pub name: String,
    pub image: String,
    pub inspect: ContainerInspectResponse,
}

impl ContainerSnapshot {
    /// Builds a snapshot from an inspect response.  Returns `None` when the daemon
    /// reported no id, which only happens for malformed responses.
    pub fn from_inspect(inspect: ContainerInspectResponse) -> Option<Self> {
        let id = inspect.id.clone().filter(|id| !id.is_empty())?;
        let name = inspect
            .name
            .as_deref()
            .map(|n| n.trim_start_matches('/'))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| short_id(&id).to_string());
        let image = inspect
            .config
            .as_ref()
            .and_then(|c| c.image.clone())
            .unwrap_or_default();
        Some(Self {
            id,
            name,
            image,
            inspect,
        })
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.inspect
            .config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .and_then(|l| l.get(key))
            .map(String::as_str)
    }

    pub fn network_mode(&self) -> Option<&str> {
        self.inspect
            .host_config
            .as_ref()
            .and_then(|h| h.network_mode.as_deref())
    }

    pub fn configured_hostname(&self) -> Option<&str> {
        self.inspect
            .config
            .as_ref()
            .and_then(|c| c.hostname.as_deref())
    }
}

/// Containers that share an image and are updated as one unit.
#[derive(Debug, Clone)]
pub struct UpdateGroup {
    /// `project:service` for Compose services, `standalone:<id>` otherwise.
    pub key: String,
    pub containers: Vec<ContainerSnapshot>,
}

impl UpdateGroup {
    /// The image of the first member; all members are assumed to share it.
    pub fn image(&self) -> Option<&str> {
        self.containers.first().map(|c| c.image.as_str())
    }
}

/// Old container id to new container id, for containers recreated in this run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecreationMap {
    entries: BTreeMap<String, String>,
}

impl RecreationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old_id: impl Into<String>, new_id: impl Into<String>) {
        self.entries.insert(old_id.into(), new_id.into());
    }

    pub fn contains(&self, old_id: &str) -> bool {
        self.entries.contains_key(old_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `reference` as an exact old id, then as an id prefix of at least
    /// [`SHORT_ID_LEN`] characters.  Shorter references are names, never prefixes.
    pub fn resolve(&self, reference: &str) -> Option<&str> {
        if reference.is_empty() {
            return None;
        }
        if let Some(new_id) = self.entries.get(reference) {
            return Some(new_id);
        }
        if reference.len() < SHORT_ID_LEN {
            return None;
        }
        self.entries
            .iter()
            .find(|(old_id, _)| {
                old_id.starts_with(reference) || reference.starts_with(short_id(old_id))
            })
            .map(|(_, new_id)| new_id.as_str())
    }

    /// The latest id of a container that may have been recreated more than once
    /// in this run.
    pub fn latest(&self, old_id: &str) -> Option<&str> {
        let mut current = self.entries.get(old_id)?;
        while let Some(next) = self.entries.get(current.as_str()) {
            if next == current {
                break;
            }
            current = next;
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Image digests observed before and after a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPair {
    /// Empty when the pre-pull lookup failed.
    pub old: String,
    pub new: String,
}

impl DigestPair {
    pub fn changed(&self) -> bool {
        crate::updater::digest::has_changed(&self.old, &self.new)
    }
}
