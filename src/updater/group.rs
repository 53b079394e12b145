//! Opt-in filtering and grouping of containers into update units.

use super::{COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ENABLE_LABEL};
use crate::types::{ContainerSnapshot, UpdateGroup};
use std::collections::HashMap;

/// Keeps containers labelled `io.repull.enable=true`, exact string match only.
pub fn filter_opted_in(containers: Vec<ContainerSnapshot>) -> Vec<ContainerSnapshot> {
    containers
        .into_iter()
        .filter(|c| c.label(ENABLE_LABEL) == Some("true"))
        .collect()
}

/// `project:service` when both Compose labels are present and non-empty,
/// `standalone:<id>` otherwise.
pub fn group_key(container: &ContainerSnapshot) -> String {
    let project = container
        .label(COMPOSE_PROJECT_LABEL)
        .filter(|p| !p.is_empty());
    let service = container
        .label(COMPOSE_SERVICE_LABEL)
        .filter(|s| !s.is_empty());
    match (project, service) {
        (Some(project), Some(service)) => format!("{}:{}", project, service),
        _ => format!("standalone:{}", container.id),
    }
}

/// Partitions `containers` into groups.
///
/// Groups come out in the order their first member appears, and members keep their
/// input order, so the same input always yields the same sequence.
pub fn group_by_compose_service(containers: Vec<ContainerSnapshot>) -> Vec<UpdateGroup> {
    let mut groups: Vec<UpdateGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for container in containers {
        let key = group_key(&container);
        match index.get(&key) {
            Some(&idx) => groups[idx].containers.push(container),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(UpdateGroup {
                    key,
                    containers: vec![container],
                });
            }
        }
    }

    groups
}
