//! Derives creation parameters for a replacement container from a live one.

use crate::types::ContainerSnapshot;
use bollard::container::{Config, NetworkingConfig};
use bollard::models::{EndpointSettings, HostConfig};
use std::collections::HashMap;

/// Everything needed to create an equivalent container.
#[derive(Debug, Clone)]
pub struct CreationParams {
    pub config: Config<String>,
    /// Networks attached after creation, with their original endpoint settings.
    pub additional_networks: Vec<(String, EndpointSettings)>,
}

impl CreationParams {
    pub fn network_mode(&self) -> Option<&str> {
        self.config
            .host_config
            .as_ref()
            .and_then(|h| h.network_mode.as_deref())
    }

    pub fn set_network_mode(&mut self, mode: Option<String>) {
        self.config
            .host_config
            .get_or_insert_with(HostConfig::default)
            .network_mode = mode;
    }

    /// Name of the network the container is created on, if any.
    pub fn primary_network(&self) -> Option<&str> {
        self.config
            .networking_config
            .as_ref()
            .and_then(|n| n.endpoints_config.keys().next())
            .map(String::as_str)
    }
}

/// Network modes that reject an explicit hostname.
fn allows_hostname(network_mode: Option<&str>) -> bool {
    match network_mode {
        Some(mode) => !(mode == "host" || mode == "none" || mode.starts_with("container:")),
        None => true,
    }
}

/// Builds the creation parameters for a replacement of `snapshot`.
///
/// The network mode is copied verbatim; callers resolve `container:` references
/// before creating.  Only one network can be given at creation time, so the
/// lexicographically first one is primary and the rest are returned as additional.
pub fn extract(snapshot: &ContainerSnapshot) -> CreationParams {
    let old_config = snapshot.inspect.config.clone().unwrap_or_default();
    let old_host = snapshot.inspect.host_config.clone().unwrap_or_default();

    let port_bindings = old_host.port_bindings.clone().unwrap_or_default();
    let exposed_ports: HashMap<String, HashMap<(), ()>> = port_bindings
        .keys()
        .map(|port| (port.clone(), HashMap::new()))
        .collect();

    let hostname = if allows_hostname(old_host.network_mode.as_deref()) {
        old_config.hostname
    } else {
        None
    };

    // The whole host config, resources included, carries over.  A container id
    // file left by the old container would make the create fail.
    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        container_id_file: None,
        ..old_host
    };

    let mut networks: Vec<(String, EndpointSettings)> = snapshot
        .inspect
        .network_settings
        .as_ref()
        .and_then(|s| s.networks.clone())
        .unwrap_or_default()
        .into_iter()
        .collect();
    networks.sort_by(|a, b| a.0.cmp(&b.0));

    let mut networks = networks.into_iter();
    let networking_config = networks.next().map(|(name, endpoint)| NetworkingConfig {
        endpoints_config: HashMap::from([(name, endpoint)]),
    });

    CreationParams {
        config: Config {
            image: Some(snapshot.image.clone()),
            cmd: old_config.cmd,
            entrypoint: old_config.entrypoint,
            env: old_config.env,
            labels: old_config.labels,
            working_dir: old_config.working_dir,
            user: old_config.user,
            hostname,
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        },
        additional_networks: networks.collect(),
    }
}
