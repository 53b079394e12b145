use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EndpointSettings, ImageInspect};
use thiserror::Error;

pub mod docker;
#[cfg(test)]
pub mod fake;

pub use docker::DockerRuntime;

/// Errors reported by a container runtime.
///
/// `NotFound` and `Conflict` are kept apart from generic API failures because the
/// updater reacts to them: a missing reference falls through to the next lookup
/// strategy, and a conflict on removal means the daemon is already removing it.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("daemon error: {0}")]
    Api(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// The subset of the daemon API the updater relies on.
///
/// Every decision re-reads state through this trait; implementations must not cache.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Running containers, fully inspected.
    async fn list_running(&self) -> Result<Vec<ContainerInspectResponse>>;

    /// Summaries of every container, including stopped ones.
    async fn list_all(&self) -> Result<Vec<ContainerSummary>>;

    async fn inspect_container(&self, reference: &str) -> Result<ContainerInspectResponse>;

    /// Pulls `image` and waits for the pull to finish.
    async fn pull_image(&self, image: &str) -> Result<()>;

    async fn inspect_image(&self, image: &str) -> Result<ImageInspect>;

    /// Creates a container named `name` and returns its id.
    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stops `id`, waiting `grace_secs` before the daemon kills it.
    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<()>;

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    async fn connect_network(
        &self,
        network: &str,
        id: &str,
        endpoint: EndpointSettings,
    ) -> Result<()>;
}
