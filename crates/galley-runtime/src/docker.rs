//! Docker backend for [`ContainerRuntime`].
//!
//! Talks to the daemon through bollard. Build contexts are packed into an
//! in-memory tar archive and sent with the build request.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{
    BuildImageOptions, CreateImageOptions, ListImagesOptions, RemoveImageOptions,
};
use bollard::secret::HealthStatusEnum;
use bollard::service::{HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime_traits::*;

/// Socket used when `DOCKER_HOST` is unset.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Grace period given to `docker stop` before it kills.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddress {
    Socket(String),
    Http(String),
}

impl std::fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonAddress::Socket(path) => write!(f, "unix://{}", path),
            DaemonAddress::Http(url) => f.write_str(url),
        }
    }
}

/// Interpret a `DOCKER_HOST` value; `tcp://` is treated as `http://`.
pub fn daemon_address(docker_host: Option<&str>) -> RuntimeResult<DaemonAddress> {
    let Some(raw) = docker_host.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DaemonAddress::Socket(DEFAULT_SOCKET.to_string()));
    };
    let invalid = |reason: String| RuntimeError::Connection {
        target: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "unix" => Ok(DaemonAddress::Socket(url.path().to_string())),
        "tcp" | "http" => {
            let host = url
                .host_str()
                .ok_or_else(|| invalid("missing host".to_string()))?;
            let port = url.port().unwrap_or(2375);
            Ok(DaemonAddress::Http(format!("http://{}:{}", host, port)))
        }
        other => Err(invalid(format!("unsupported scheme `{}`", other))),
    }
}

/// [`ContainerRuntime`] backed by a Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    address: DaemonAddress,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST`, falling back to the local socket.
    pub fn connect(timeout: Duration) -> RuntimeResult<Self> {
        let docker_host = std::env::var("DOCKER_HOST").ok();
        Self::connect_to(daemon_address(docker_host.as_deref())?, timeout)
    }

    /// Connect to an explicit daemon address.
    ///
    /// No request is made; an unreachable daemon surfaces on first use.
    pub fn connect_to(address: DaemonAddress, timeout: Duration) -> RuntimeResult<Self> {
        let secs = timeout.as_secs().max(1);
        let docker = match &address {
            DaemonAddress::Socket(path) => {
                Docker::connect_with_socket(path, secs, API_DEFAULT_VERSION)
            }
            DaemonAddress::Http(url) => Docker::connect_with_http(url, secs, API_DEFAULT_VERSION),
        }
        .map_err(|e| RuntimeError::Connection {
            target: address.to_string(),
            reason: e.to_string(),
        })?;

        debug!(address = %address, timeout_secs = secs, "docker client configured");
        Ok(Self { docker, address })
    }

    pub fn address(&self) -> &DaemonAddress {
        &self.address
    }
}

/// Pack the directory at `context` into a tar archive for the daemon.
pub fn build_context(context: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);
    archive.append_dir_all(".", context)?;
    archive.into_inner()
}

/// Image id announced by a classic builder output line.
fn id_from_build_output(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("Successfully built ")?;
    rest.split_whitespace().next().map(str::to_string)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn build_image(&self, context: &Path, tag: &str) -> RuntimeResult<Option<String>> {
        info!(context = %context.display(), tag = %tag, "building image");
        let failed = |reason: String| RuntimeError::BuildFailed {
            context: context.display().to_string(),
            reason,
        };

        let dir = context.to_path_buf();
        let body = tokio::task::spawn_blocking(move || build_context(&dir))
            .await
            .map_err(|e| failed(e.to_string()))?
            .map_err(|e| failed(format!("cannot pack build context: {}", e)))?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut id = None;
        let mut stream = self.docker.build_image(options, None, Some(body.into()));
        while let Some(message) = stream.next().await {
            let message = message.map_err(|e| failed(e.to_string()))?;
            if let Some(error) = message.error {
                return Err(failed(error));
            }
            if let Some(line) = message.stream.as_deref() {
                debug!(tag = %tag, output = %line.trim_end(), "build output");
                if let Some(built) = id_from_build_output(line) {
                    id = Some(built);
                }
            }
            if let Some(built) = message.aux.and_then(|aux| aux.id) {
                id = Some(built);
            }
        }

        debug!(tag = %tag, id = ?id, "build finished");
        Ok(id)
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
        let (repo, tag) = split_reference(reference);
        let options = CreateImageOptions {
            from_image: repo.to_string(),
            tag: tag.unwrap_or(DEFAULT_TAG).to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(|e| RuntimeError::from_docker(e, "image", reference))?;
            if let Some(status) = progress.status {
                debug!(image = %reference, status = %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn list_images(&self) -> RuntimeResult<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        Ok(self
            .docker
            .list_images(Some(options))
            .await?
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                repo_tags: image.repo_tags,
            })
            .collect())
    }

    async fn create_container(&self, request: &ContainerRequest) -> RuntimeResult<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = request
            .exposed_ports
            .iter()
            .map(|port| (format!("{}/tcp", port), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = request
            .port_bindings
            .iter()
            .map(|mapping| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.host.to_string()),
                };
                (format!("{}/tcp", mapping.container), Some(vec![binding]))
            })
            .collect();

        let volumes: HashMap<String, HashMap<(), ()>> = request
            .volumes
            .iter()
            .map(|volume| (volume.clone(), HashMap::new()))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(request.binds.iter().map(VolumeBind::spec).collect()),
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            cmd: request.command.clone(),
            env: Some(request.env_pairs()),
            exposed_ports: Some(exposed_ports),
            volumes: Some(volumes),
            labels: Some(request.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = request.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| RuntimeError::from_docker(e, "image", &request.image))?;
        for warning in &response.warnings {
            debug!(container = %response.id, warning = %warning, "create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::from_docker(e, "container", id))
    }

    async fn stop_container(&self, id: &str) -> RuntimeResult<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        match self.docker.stop_container(id, Some(options)).await {
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            other => other.map_err(|e| RuntimeError::from_docker(e, "container", id)),
        }
    }

    async fn kill_container(&self, id: &str, signal: &str) -> RuntimeResult<()> {
        let options = KillContainerOptions {
            signal: signal.to_string(),
        };
        self.docker
            .kill_container(id, Some(options))
            .await
            .map_err(|e| RuntimeError::from_docker(e, "container", id))
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| RuntimeError::from_docker(e, "container", id))
    }

    async fn remove_image(&self, reference: &str) -> RuntimeResult<()> {
        let target = if is_image_id(reference) {
            reference.to_string()
        } else {
            normalize_reference(reference)
        };
        let options = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.docker
            .remove_image(&target, Some(options), None)
            .await
            .map_err(|e| RuntimeError::from_docker(e, "image", &target))?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        Ok(self
            .docker
            .list_containers(Some(options))
            .await?
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                labels: c.labels.unwrap_or_default().into_iter().collect(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerState> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| RuntimeError::from_docker(e, "container", id))?;

        let state = inspect.state.unwrap_or_default();
        let health = state
            .health
            .and_then(|h| h.status)
            .and_then(|status| match status {
                HealthStatusEnum::STARTING => Some(HealthState::Starting),
                HealthStatusEnum::HEALTHY => Some(HealthState::Healthy),
                HealthStatusEnum::UNHEALTHY => Some(HealthState::Unhealthy),
                _ => None,
            });

        Ok(ContainerState {
            running: state.running.unwrap_or(false),
            status: state.status.map(|s| s.to_string()).unwrap_or_default(),
            health,
        })
    }
}
