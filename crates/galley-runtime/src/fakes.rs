//! In-memory fake runtime (testing only)
//!
//! `MemoryRuntime` satisfies the `ContainerRuntime` contract without a
//! daemon and records every call so tests can assert on ordering. Failure
//! knobs inject the error paths the engine must handle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime_traits::*;

#[derive(Debug, Clone)]
struct FakeImage {
    id: String,
    repo_tags: Vec<String>,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    request: ContainerRequest,
    running: bool,
}

#[derive(Debug, Default)]
struct State {
    images: Vec<FakeImage>,
    containers: BTreeMap<String, FakeContainer>,
    created: Vec<String>,
    calls: Vec<String>,
    seq: u64,

    failing_builds: u32,
    idless_builds: u32,
    phantom_pulls: HashSet<String>,
    failing_pulls: HashSet<String>,
    failing_creates: HashSet<String>,
    failing_starts: HashSet<String>,
    failing_stops: bool,
    failing_image_removals: HashSet<String>,
    unhealthy: HashSet<String>,
}

impl State {
    fn next_id(&mut self) -> String {
        self.seq += 1;
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{:032x}", uuid, self.seq)
    }

    fn container_key(&self, id: &str) -> Option<String> {
        if id.is_empty() {
            return None;
        }
        self.containers
            .keys()
            .find(|key| key.starts_with(id))
            .cloned()
    }

    fn add_image(&mut self, id: String, tag: Option<String>) {
        if let Some(tag) = &tag {
            for image in &mut self.images {
                image.repo_tags.retain(|t| t != tag);
            }
        }
        self.images.push(FakeImage {
            id,
            repo_tags: tag.into_iter().collect(),
        });
    }
}

/// In-memory [`ContainerRuntime`].
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<State>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an image as if it had been pulled earlier.
    pub fn with_image(self, reference: &str) -> Self {
        {
            let mut state = self.lock();
            let id = format!("sha256:{}", state.next_id());
            state.add_image(id, Some(normalize_reference(reference)));
        }
        self
    }

    /// Fail the next `count` builds.
    pub fn fail_builds(&self, count: u32) {
        self.lock().failing_builds = count;
    }

    /// The next `count` builds succeed but report no id.
    pub fn builds_without_id(&self, count: u32) {
        self.lock().idless_builds = count;
    }

    /// Pulls of `reference` fail outright.
    pub fn fail_pull(&self, reference: &str) {
        self.lock().failing_pulls.insert(normalize_reference(reference));
    }

    /// Pulls of `reference` report success but no image appears.
    pub fn pull_without_image(&self, reference: &str) {
        self.lock().phantom_pulls.insert(normalize_reference(reference));
    }

    /// Creating containers from `image` fails.
    pub fn fail_create(&self, image: &str) {
        self.lock().failing_creates.insert(image.to_string());
    }

    /// Starting containers created from `image` fails.
    pub fn fail_start(&self, image: &str) {
        self.lock().failing_starts.insert(image.to_string());
    }

    /// Every graceful stop fails.
    pub fn fail_stops(&self) {
        self.lock().failing_stops = true;
    }

    /// Removing `reference` fails with an API error.
    pub fn fail_image_removal(&self, reference: &str) {
        self.lock()
            .failing_image_removals
            .insert(normalize_reference(reference));
    }

    /// Containers from `image` report an unhealthy health check.
    pub fn mark_unhealthy(&self, image: &str) {
        self.lock().unhealthy.insert(image.to_string());
    }

    /// Every call made so far, e.g. `"start:<id>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls to `operation` (the part before the first `:`).
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    /// Ids of all containers ever created, in order.
    pub fn created_containers(&self) -> Vec<String> {
        self.lock().created.clone()
    }

    /// Ids of containers that still exist.
    pub fn live_containers(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    /// The request a container was created from.
    pub fn request_for(&self, id: &str) -> Option<ContainerRequest> {
        let state = self.lock();
        let key = state.container_key(id)?;
        state.containers.get(&key).map(|c| c.request.clone())
    }

    /// Repo tags of every image present.
    pub fn image_tags(&self) -> Vec<String> {
        self.lock()
            .images
            .iter()
            .flat_map(|i| i.repo_tags.clone())
            .collect()
    }

    pub fn image_count(&self) -> usize {
        self.lock().images.len()
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn build_image(&self, context: &Path, tag: &str) -> RuntimeResult<Option<String>> {
        let mut state = self.lock();
        state.calls.push(format!("build:{}:{}", context.display(), tag));

        if state.failing_builds > 0 {
            state.failing_builds -= 1;
            return Err(RuntimeError::BuildFailed {
                context: context.display().to_string(),
                reason: "injected build failure".to_string(),
            });
        }
        if state.idless_builds > 0 {
            state.idless_builds -= 1;
            return Ok(None);
        }

        let id = format!("sha256:{}", state.next_id());
        state.add_image(id.clone(), Some(normalize_reference(tag)));
        Ok(Some(id))
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        let reference = normalize_reference(reference);
        state.calls.push(format!("pull:{}", reference));

        if state.failing_pulls.contains(&reference) {
            return Err(RuntimeError::not_found("image", reference));
        }
        if state.phantom_pulls.contains(&reference) {
            return Ok(());
        }
        let present = state
            .images
            .iter()
            .any(|i| i.repo_tags.contains(&reference));
        if !present {
            let id = format!("sha256:{}", state.next_id());
            state.add_image(id, Some(reference));
        }
        Ok(())
    }

    async fn list_images(&self) -> RuntimeResult<Vec<ImageSummary>> {
        let mut state = self.lock();
        state.calls.push("list_images".to_string());
        Ok(state
            .images
            .iter()
            .map(|i| ImageSummary {
                id: i.id.clone(),
                repo_tags: i.repo_tags.clone(),
            })
            .collect())
    }

    async fn create_container(&self, request: &ContainerRequest) -> RuntimeResult<String> {
        let mut state = self.lock();
        state.calls.push(format!("create:{}", request.image));

        if state.failing_creates.contains(&request.image) {
            return Err(RuntimeError::Api(format!(
                "injected create failure for {}",
                request.image
            )));
        }
        let known = state.images.iter().any(|i| {
            image_matches(
                &ImageSummary {
                    id: i.id.clone(),
                    repo_tags: i.repo_tags.clone(),
                },
                &request.image,
            )
        });
        if !known {
            return Err(RuntimeError::not_found("image", request.image.clone()));
        }

        let id = state.next_id();
        state.containers.insert(
            id.clone(),
            FakeContainer {
                request: request.clone(),
                running: false,
            },
        );
        state.created.push(id.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("start:{}", id));

        let key = state
            .container_key(id)
            .ok_or_else(|| RuntimeError::not_found("container", id))?;
        let image = state.containers[&key].request.image.clone();
        if state.failing_starts.contains(&image) {
            return Err(RuntimeError::Api(format!("injected start failure for {}", image)));
        }
        if let Some(container) = state.containers.get_mut(&key) {
            container.running = true;
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("stop:{}", id));

        let key = state
            .container_key(id)
            .ok_or_else(|| RuntimeError::not_found("container", id))?;
        if state.failing_stops {
            return Err(RuntimeError::Api("injected stop failure".to_string()));
        }
        if let Some(container) = state.containers.get_mut(&key) {
            container.running = false;
        }
        Ok(())
    }

    async fn kill_container(&self, id: &str, signal: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("kill:{}:{}", id, signal));

        let key = state
            .container_key(id)
            .ok_or_else(|| RuntimeError::not_found("container", id))?;
        match state.containers.get_mut(&key) {
            Some(container) if container.running => {
                container.running = false;
                Ok(())
            }
            _ => Err(RuntimeError::Api(format!("container {} is not running", id))),
        }
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("remove_container:{}", id));

        let key = state
            .container_key(id)
            .ok_or_else(|| RuntimeError::not_found("container", id))?;
        state.containers.remove(&key);
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("remove_image:{}", reference));

        if state
            .failing_image_removals
            .contains(&normalize_reference(reference))
        {
            return Err(RuntimeError::Api(format!(
                "injected removal failure for {}",
                reference
            )));
        }

        let before = state.images.len();
        state.images.retain(|i| {
            !image_matches(
                &ImageSummary {
                    id: i.id.clone(),
                    repo_tags: i.repo_tags.clone(),
                },
                reference,
            )
        });
        if state.images.len() == before {
            return Err(RuntimeError::not_found("image", reference));
        }
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>> {
        let mut state = self.lock();
        state.calls.push(format!("list_containers:{}", all));
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| all || c.running)
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                names: c
                    .request
                    .name
                    .iter()
                    .map(|n| format!("/{}", n))
                    .collect(),
                image: c.request.image.clone(),
                state: if c.running { "running" } else { "created" }.to_string(),
                labels: c.request.labels.clone(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerState> {
        let mut state = self.lock();
        state.calls.push(format!("inspect:{}", id));

        let key = state
            .container_key(id)
            .ok_or_else(|| RuntimeError::not_found("container", id))?;
        let container = &state.containers[&key];
        let health = if state.unhealthy.contains(&container.request.image) {
            Some(HealthState::Unhealthy)
        } else {
            None
        };
        Ok(ContainerState {
            running: container.running,
            status: if container.running { "running" } else { "created" }.to_string(),
            health,
        })
    }
}

/// Environment variables of a recorded request, as a map.
pub fn request_env(request: &ContainerRequest) -> HashMap<String, String> {
    request.environment.iter().cloned().collect()
}
