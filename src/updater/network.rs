//! `container:<ref>` network modes.
//!
//! Compose stores `network_mode: service:X` as a frozen `container:<id>`, which goes
//! stale the moment X is recreated.  These helpers point such modes back at a live
//! container and find the containers left stranded by a replacement.

use crate::runtime::{ContainerRuntime, Result};
use crate::types::{sanitize, short_id, ContainerSnapshot, RecreationMap};
use log::{debug, warn};

const CONTAINER_PREFIX: &str = "container:";

/// The referenced container of a `container:<ref>` mode.
pub fn container_ref(mode: &str) -> Option<&str> {
    mode.strip_prefix(CONTAINER_PREFIX).filter(|r| !r.is_empty())
}

/// Rewrites `mode` to reference the current id of its target.
///
/// Lookup order: containers recreated in this run, a direct inspect of the
/// reference, then a name match over all containers.  An unresolvable mode is
/// returned unchanged and left for the create call to reject.
pub async fn resolve_network_mode(
    runtime: &dyn ContainerRuntime,
    mode: &str,
    recreated: &RecreationMap,
) -> String {
    let Some(reference) = container_ref(mode) else {
        return mode.to_string();
    };

    if let Some(new_id) = recreated.resolve(reference) {
        debug!("network mode {} -> recreated {}", sanitize(mode), short_id(new_id));
        return format!("{}{}", CONTAINER_PREFIX, new_id);
    }

    match runtime.inspect_container(reference).await {
        Ok(inspect) => {
            if let Some(id) = inspect.id.filter(|id| !id.is_empty()) {
                return format!("{}{}", CONTAINER_PREFIX, id);
            }
        }
        Err(e) => debug!(
            "network mode target {} not inspectable: {}",
            sanitize(reference),
            sanitize(&e.to_string())
        ),
    }

    let containers = match runtime.list_all().await {
        Ok(c) => c,
        Err(e) => {
            warn!(
                "Cannot list containers to resolve {}: {}",
                sanitize(mode),
                sanitize(&e.to_string())
            );
            return mode.to_string();
        }
    };
    for c in containers {
        let matches = c
            .names
            .iter()
            .flatten()
            .any(|name| name == reference || name.trim_start_matches('/') == reference);
        if matches {
            if let Some(id) = c.id {
                return format!("{}{}", CONTAINER_PREFIX, id);
            }
        }
    }

    mode.to_string()
}

/// Whether `mode` pointed at the container that had `old_id` and `old_name`.
fn references(mode: &str, old_id: &str, old_name: &str) -> bool {
    match container_ref(mode) {
        Some(r) => {
            r == old_id
                || (r.len() >= short_id(old_id).len() && old_id.starts_with(r))
                || r.trim_start_matches('/') == old_name
        }
        None => false,
    }
}

/// Running containers whose network mode still references the replaced container.
pub async fn find_network_dependents(
    runtime: &dyn ContainerRuntime,
    old: &ContainerSnapshot,
) -> Result<Vec<ContainerSnapshot>> {
    let running = runtime.list_running().await?;
    Ok(running
        .into_iter()
        .filter_map(ContainerSnapshot::from_inspect)
        .filter(|c| c.id != old.id)
        .filter(|c| {
            c.network_mode()
                .is_some_and(|mode| references(mode, &old.id, &old.name))
        })
        .collect())
}
