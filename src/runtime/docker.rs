use super::{ContainerRuntime, Result, RuntimeError};
use crate::types::sanitize;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    RenameContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EndpointSettings, ImageInspect};
use bollard::network::ConnectNetworkOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;

/// Seconds bollard waits on a single request before giving up.
const REQUEST_TIMEOUT_SECS: u64 = 120;
const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the daemon and verifies the connection with a bounded ping.
    ///
    /// `host` accepts `unix://`, `tcp://` and `http://` addresses. Without one the
    /// local defaults are used, which honour `DOCKER_HOST`.
    pub async fn connect(host: Option<&str>) -> Result<Self> {
        let docker = match host {
            Some(h) if h.starts_with("unix://") => {
                Docker::connect_with_unix(h, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(h) if h.starts_with("tcp://") || h.starts_with("http://") => {
                Docker::connect_with_http(h, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(h) => {
                return Err(RuntimeError::Transport(format!(
                    "unsupported docker host scheme: {}",
                    h
                )))
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(map_err)?;

        let runtime = Self { docker };
        tokio::time::timeout(PING_TIMEOUT, runtime.ping())
            .await
            .map_err(|_| RuntimeError::Transport("timed out waiting for daemon ping".into()))??;
        info!("Connected to Docker daemon");
        Ok(runtime)
    }
}

fn map_err(err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            404 => RuntimeError::NotFound(message),
            409 => RuntimeError::Conflict(message),
            _ => RuntimeError::Api(format!("{} (status {})", message, status_code)),
        },
        BollardError::DockerStreamError { error } => RuntimeError::Api(error),
        other => RuntimeError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map(|_| ()).map_err(map_err)
    }

    async fn list_running(&self) -> Result<Vec<ContainerInspectResponse>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let opts = ListContainersOptions::<String> {
            all: false,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(map_err)?;

        let mut detailed = Vec::with_capacity(containers.len());
        for c in containers {
            let Some(id) = c.id else { continue };
            let detail = self
                .docker
                .inspect_container(&id, None)
                .await
                .map_err(map_err)?;
            detailed.push(detail);
        }
        Ok(detailed)
    }

    async fn list_all(&self) -> Result<Vec<ContainerSummary>> {
        let opts = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        self.docker
            .list_containers(Some(opts))
            .await
            .map_err(map_err)
    }

    async fn inspect_container(&self, reference: &str) -> Result<ContainerInspectResponse> {
        self.docker
            .inspect_container(reference, None)
            .await
            .map_err(map_err)
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let opts = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(opts), None, None);
        // The pull only completes once the progress stream is drained.
        while let Some(item) = stream.next().await {
            let info = item.map_err(map_err)?;
            if let Some(status) = info.status {
                debug!("pull {}: {}", sanitize(image), sanitize(&status));
            }
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInspect> {
        self.docker.inspect_image(image).await.map_err(map_err)
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String> {
        let opts = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let resp = self
            .docker
            .create_container(Some(opts), config)
            .await
            .map_err(map_err)?;
        for warning in resp.warnings {
            debug!("create {}: {}", sanitize(name), sanitize(&warning));
        }
        Ok(resp.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_err)
    }

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace_secs }))
            .await
            .map_err(map_err)
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()> {
        self.docker
            .rename_container(id, RenameContainerOptions { name: new_name })
            .await
            .map_err(map_err)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(opts))
            .await
            .map_err(map_err)
    }

    async fn connect_network(
        &self,
        network: &str,
        id: &str,
        endpoint: EndpointSettings,
    ) -> Result<()> {
        let opts = ConnectNetworkOptions {
            container: id,
            endpoint_config: endpoint,
        };
        self.docker
            .connect_network(network, opts)
            .await
            .map_err(map_err)
    }
}
