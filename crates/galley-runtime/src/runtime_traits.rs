//! Container runtime abstraction.
//!
//! `ContainerRuntime` is the only seam between Galley and the container
//! engine. `DockerRuntime` talks to a Docker daemon; `MemoryRuntime` (in
//! `fakes`) satisfies the same contract in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{RuntimeError, RuntimeResult};

/// Tag assumed when a reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Number of id characters compared when matching a short image id.
pub const SHORT_ID_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Requests and summaries
// ---------------------------------------------------------------------------

/// `container:host` TCP port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container: u16,
    pub host: u16,
}

/// Host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBind {
    pub host: PathBuf,
    pub container: String,
}

impl VolumeBind {
    /// `host:container` form understood by the engine.
    pub fn spec(&self) -> String {
        format!("{}:{}", self.host.display(), self.container)
    }
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub image: String,
    pub name: Option<String>,
    pub command: Option<Vec<String>>,
    /// Ordered `KEY=value` pairs.
    pub environment: Vec<(String, String)>,
    pub exposed_ports: Vec<u16>,
    pub port_bindings: Vec<PortMapping>,
    pub volumes: Vec<String>,
    pub binds: Vec<VolumeBind>,
    pub labels: BTreeMap<String, String>,
}

impl ContainerRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Expose `container`; bind it to `host` when given.
    pub fn with_port(mut self, container: u16, host: Option<u16>) -> Self {
        self.exposed_ports.push(container);
        if let Some(host) = host {
            self.port_bindings.push(PortMapping { container, host });
        }
        self
    }

    /// Declare volume `container`; bind `host` onto it when given.
    pub fn with_volume(mut self, container: impl Into<String>, host: Option<PathBuf>) -> Self {
        let container = container.into();
        if let Some(host) = host {
            self.binds.push(VolumeBind {
                host,
                container: container.clone(),
            });
        }
        self.volumes.push(container);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Environment in `KEY=value` form.
    pub fn env_pairs(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub labels: BTreeMap<String, String>,
}

/// Health as reported by the container's health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
}

/// Result of inspecting a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub running: bool,
    pub status: String,
    /// `None` when the image defines no health check.
    pub health: Option<HealthState>,
}

// ---------------------------------------------------------------------------
// ContainerRuntime
// ---------------------------------------------------------------------------

/// Operations Galley needs from a container engine.
///
/// Guarantees:
/// - Calls on a missing image or container fail with `RuntimeError::NotFound`.
/// - `create_container` does not start the container.
/// - Port and volume bindings in the request are applied at creation;
///   `start_container` takes only the id.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build the context directory at `context` tagged `tag`.
    ///
    /// Returns the image id when the engine reported one.
    async fn build_image(&self, context: &Path, tag: &str) -> RuntimeResult<Option<String>>;

    /// Fetch `reference` from its registry; the tag defaults to `latest`.
    async fn pull_image(&self, reference: &str) -> RuntimeResult<()>;

    async fn list_images(&self) -> RuntimeResult<Vec<ImageSummary>>;

    /// Create a container and return its id.
    async fn create_container(&self, request: &ContainerRequest) -> RuntimeResult<String>;

    async fn start_container(&self, id: &str) -> RuntimeResult<()>;

    /// Gracefully stop; stopping a stopped container succeeds.
    async fn stop_container(&self, id: &str) -> RuntimeResult<()>;

    async fn kill_container(&self, id: &str, signal: &str) -> RuntimeResult<()>;

    async fn remove_container(&self, id: &str) -> RuntimeResult<()>;

    /// Remove an image by id or by reference (tag defaults to `latest`).
    async fn remove_image(&self, reference: &str) -> RuntimeResult<()>;

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>>;

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerState>;
}

// ---------------------------------------------------------------------------
// Reference helpers
// ---------------------------------------------------------------------------

/// Split `repo[:tag]` into its parts.
///
/// A `:` inside the registry host (`registry:5000/app`) is not a tag
/// separator. Digest references (`repo@sha256:..`) carry no tag.
pub fn split_reference(reference: &str) -> (&str, Option<&str>) {
    if reference.contains('@') {
        return (reference, None);
    }
    let last_slash = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[last_slash..].rfind(':') {
        Some(i) => {
            let at = last_slash + i;
            (&reference[..at], Some(&reference[at + 1..]))
        }
        None => (reference, None),
    }
}

/// `reference` with an explicit tag, defaulting to `latest`.
pub fn normalize_reference(reference: &str) -> String {
    match split_reference(reference) {
        (_, Some(_)) => reference.to_string(),
        (repo, None) if repo.contains('@') => reference.to_string(),
        (repo, None) => format!("{}:{}", repo, DEFAULT_TAG),
    }
}

/// Whether `value` looks like an image id rather than a reference.
pub fn is_image_id(value: &str) -> bool {
    let hex = value.strip_prefix("sha256:").unwrap_or(value);
    hex.len() >= SHORT_ID_LEN && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn short_id(id: &str) -> &str {
    let hex = id.strip_prefix("sha256:").unwrap_or(id);
    &hex[..SHORT_ID_LEN.min(hex.len())]
}

/// Whether `image` matches `wanted`, given as id or reference.
///
/// Ids match on their first 12 hex characters; references match a repo tag
/// exactly after tag normalization.
pub fn image_matches(image: &ImageSummary, wanted: &str) -> bool {
    if is_image_id(wanted) && short_id(&image.id) == short_id(wanted) {
        return true;
    }
    let wanted = normalize_reference(wanted);
    image.repo_tags.iter().any(|tag| *tag == wanted)
}

/// Whether an image matching `wanted` is present.
pub async fn image_exists(runtime: &dyn ContainerRuntime, wanted: &str) -> RuntimeResult<bool> {
    Ok(runtime
        .list_images()
        .await?
        .iter()
        .any(|image| image_matches(image, wanted)))
}

/// Whether a container with this id (or id prefix, or name) exists.
pub async fn container_exists(runtime: &dyn ContainerRuntime, id: &str) -> RuntimeResult<bool> {
    if id.is_empty() {
        return Ok(false);
    }
    Ok(runtime.list_containers(true).await?.iter().any(|c| {
        c.id.starts_with(id) || c.names.iter().any(|n| n.trim_start_matches('/') == id)
    }))
}

/// Whether the container is running; a missing container is not running.
pub async fn container_running(runtime: &dyn ContainerRuntime, id: &str) -> RuntimeResult<bool> {
    match runtime.inspect_container(id).await {
        Ok(state) => Ok(state.running),
        Err(RuntimeError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
