//! In-memory runtime used by the engine tests.
//!
//! Keeps a small model of containers and images, records every call, and lets a
//! test arrange one-shot failures for a given operation.

use super::{ContainerRuntime, Result, RuntimeError};
use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerState, ContainerSummary,
    EndpointSettings, HostConfig, ImageInspect, NetworkSettings,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Pull,
    InspectImage,
    Create,
    Start,
    Stop,
    Rename,
    Remove,
    Connect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull(String),
    Create { name: String, network_mode: Option<String> },
    Start(String),
    Stop { id: String, grace: i64 },
    Rename { id: String, name: String },
    Remove { id: String, force: bool },
    Connect { network: String, id: String },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Pull(_))
    }
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    running: bool,
    config: ContainerConfig,
    host_config: HostConfig,
    networks: HashMap<String, EndpointSettings>,
}

impl FakeContainer {
    fn inspect(&self) -> ContainerInspectResponse {
        ContainerInspectResponse {
            id: Some(self.id.clone()),
            name: Some(format!("/{}", self.name)),
            config: Some(self.config.clone()),
            host_config: Some(self.host_config.clone()),
            network_settings: Some(NetworkSettings {
                networks: Some(self.networks.clone()),
                ..Default::default()
            }),
            state: Some(ContainerState {
                running: Some(self.running),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct State {
    containers: Vec<FakeContainer>,
    images: HashMap<String, ImageInspect>,
    /// Image state that replaces `images[ref]` once `ref` is pulled.
    upstream: HashMap<String, ImageInspect>,
    failures: Vec<(Op, Option<String>)>,
    /// Containers whose removal the daemon is already performing; the value is the
    /// number of inspects that still see the container.
    removing: HashMap<String, u32>,
    calls: Vec<Call>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

/// A 64 character hex id derived from `seed`, with a distinct short id per seed.
pub fn fake_id(seed: u64) -> String {
    format!("{:012x}{:052x}", seed, seed)
}

fn image_with_digest(digest: &str) -> ImageInspect {
    ImageInspect {
        id: Some(format!("sha256:local-{}", digest)),
        repo_digests: Some(vec![format!("repo@{}", digest)]),
        ..Default::default()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a running container built from `inspect`.
    pub fn add_container(&self, inspect: ContainerInspectResponse) {
        let mut state = self.state.lock().unwrap();
        let networks = inspect
            .network_settings
            .and_then(|n| n.networks)
            .unwrap_or_default();
        state.containers.push(FakeContainer {
            id: inspect.id.unwrap_or_default(),
            name: inspect
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            running: true,
            config: inspect.config.unwrap_or_default(),
            host_config: inspect.host_config.unwrap_or_default(),
            networks,
        });
    }

    /// Registers the local digest of `image` and the digest a pull will produce.
    pub fn set_image(&self, image: &str, local: &str, upstream: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .images
            .insert(image.to_string(), image_with_digest(local));
        state
            .upstream
            .insert(image.to_string(), image_with_digest(upstream));
    }

    /// Registers a locally built image that has no registry digest.
    pub fn set_local_image(&self, image: &str, id: &str) {
        self.state.lock().unwrap().images.insert(
            image.to_string(),
            ImageInspect {
                id: Some(id.to_string()),
                ..Default::default()
            },
        );
    }

    /// Makes the next `op` call fail; `target` narrows it to one id, name or image.
    pub fn fail_once(&self, op: Op, target: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((op, target.map(str::to_string)));
    }

    /// The daemon reports removal of `id` as already in progress; the container
    /// stays visible for `polls` more inspects.
    pub fn removal_in_progress(&self, id: &str, polls: u32) {
        self.state
            .lock()
            .unwrap()
            .removing
            .insert(id.to_string(), polls);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    /// `(id, name, running)` for every container, in creation order.
    pub fn containers(&self) -> Vec<(String, String, bool)> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| (c.id.clone(), c.name.clone(), c.running))
            .collect()
    }

    pub fn container_named(&self, name: &str) -> Option<ContainerInspectResponse> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(FakeContainer::inspect)
    }
}

impl State {
    fn take_failure(&mut self, op: Op, target: &str) -> Result<()> {
        let pos = self.failures.iter().position(|(o, t)| {
            *o == op && t.as_deref().map_or(true, |t| t == target)
        });
        match pos {
            Some(pos) => {
                self.failures.remove(pos);
                Err(RuntimeError::Api(format!("injected {:?} failure", op)))
            }
            None => Ok(()),
        }
    }

    fn find(&self, reference: &str) -> Option<usize> {
        let name = reference.trim_start_matches('/');
        self.containers
            .iter()
            .position(|c| c.id == reference || c.name == name)
            .or_else(|| {
                if reference.len() < 4 {
                    return None;
                }
                self.containers
                    .iter()
                    .position(|c| c.id.starts_with(reference))
            })
    }

    fn get_mut(&mut self, reference: &str) -> Result<&mut FakeContainer> {
        match self.find(reference) {
            Some(idx) => Ok(&mut self.containers[idx]),
            None => Err(RuntimeError::NotFound(format!(
                "No such container: {}",
                reference
            ))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<ContainerInspectResponse>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.running)
            .map(FakeContainer::inspect)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|c| ContainerSummary {
                id: Some(c.id.clone()),
                names: Some(vec![format!("/{}", c.name)]),
                ..Default::default()
            })
            .collect())
    }

    async fn inspect_container(&self, reference: &str) -> Result<ContainerInspectResponse> {
        let mut state = self.state.lock().unwrap();
        let idx = state.find(reference).ok_or_else(|| {
            RuntimeError::NotFound(format!("No such container: {}", reference))
        })?;
        let id = state.containers[idx].id.clone();
        match state.removing.get(&id).copied() {
            Some(0) => {
                state.removing.remove(&id);
                state.containers.remove(idx);
                return Err(RuntimeError::NotFound(format!(
                    "No such container: {}",
                    reference
                )));
            }
            Some(polls) => {
                state.removing.insert(id, polls - 1);
            }
            None => {}
        }
        Ok(state.containers[idx].inspect())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Pull(image.to_string()));
        state.take_failure(Op::Pull, image)?;
        if let Some(upstream) = state.upstream.get(image).cloned() {
            state.images.insert(image.to_string(), upstream);
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInspect> {
        let mut state = self.state.lock().unwrap();
        state.take_failure(Op::InspectImage, image)?;
        state
            .images
            .get(image)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("No such image: {}", image)))
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let host_config = config.host_config.clone().unwrap_or_default();
        state.calls.push(Call::Create {
            name: name.to_string(),
            network_mode: host_config.network_mode.clone(),
        });
        state.take_failure(Op::Create, name)?;
        if state.containers.iter().any(|c| c.name == name) {
            return Err(RuntimeError::Conflict(format!(
                "container name \"/{}\" is already in use",
                name
            )));
        }
        state.next_id += 1;
        let id = fake_id(0xfeed_0000 + state.next_id);
        let networks = config
            .networking_config
            .map(|n| n.endpoints_config)
            .unwrap_or_default();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            running: false,
            config: ContainerConfig {
                hostname: config.hostname,
                user: config.user,
                env: config.env,
                cmd: config.cmd,
                image: config.image,
                working_dir: config.working_dir,
                entrypoint: config.entrypoint,
                labels: config.labels,
                ..Default::default()
            },
            host_config,
            networks,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(id.to_string()));
        state.take_failure(Op::Start, id)?;
        state.get_mut(id)?.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Stop {
            id: id.to_string(),
            grace: grace_secs,
        });
        state.take_failure(Op::Stop, id)?;
        state.get_mut(id)?.running = false;
        Ok(())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Rename {
            id: id.to_string(),
            name: new_name.to_string(),
        });
        state.take_failure(Op::Rename, id)?;
        if state
            .containers
            .iter()
            .any(|c| c.name == new_name && c.id != id)
        {
            return Err(RuntimeError::Conflict(format!(
                "name \"/{}\" is already in use",
                new_name
            )));
        }
        state.get_mut(id)?.name = new_name.to_string();
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove {
            id: id.to_string(),
            force,
        });
        state.take_failure(Op::Remove, id)?;
        if state.removing.contains_key(id) {
            return Err(RuntimeError::Conflict(format!(
                "removal of container {} is already in progress",
                id
            )));
        }
        let idx = state
            .find(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {}", id)))?;
        if state.containers[idx].running && !force {
            return Err(RuntimeError::Conflict(format!(
                "cannot remove running container {}",
                id
            )));
        }
        state.containers.remove(idx);
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        id: &str,
        endpoint: EndpointSettings,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Connect {
            network: network.to_string(),
            id: id.to_string(),
        });
        state.take_failure(Op::Connect, network)?;
        state
            .get_mut(id)?
            .networks
            .insert(network.to_string(), endpoint);
        Ok(())
    }
}
