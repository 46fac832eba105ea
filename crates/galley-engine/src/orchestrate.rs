//! Resource orchestration: create and start containers in declaration order.

use galley_core::resolve::resolve_resource;
use galley_core::{obs, Environment, PortAllocator, ResolvedResource, ResourceSpec, Spec};
use galley_runtime::{container_running, ContainerRequest, ContainerRuntime};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::readiness::ReadinessCheck;

/// Label carrying the run id on every container.
pub const RUN_LABEL: &str = "galley.run";

/// Label carrying the config digest on every container.
pub const CONFIG_LABEL: &str = "galley.config";

/// Creates, starts and readies each resource.
pub struct ResourceOrchestrator<'a> {
    runtime: &'a dyn ContainerRuntime,
    ports: &'a dyn PortAllocator,
    readiness: &'a dyn ReadinessCheck,
    labels: BTreeMap<String, String>,
}

impl<'a> ResourceOrchestrator<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        ports: &'a dyn PortAllocator,
        readiness: &'a dyn ReadinessCheck,
    ) -> Self {
        Self {
            runtime,
            ports,
            readiness,
            labels: BTreeMap::new(),
        }
    }

    /// Label every created container with `key=value`.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Bring up every resource of `spec`, strictly one after another.
    ///
    /// A resource is recorded in `env` right after its container is
    /// created, before it is started, so cleanup sees it even if the start
    /// fails.
    pub async fn orchestrate_all(&self, spec: &Spec, env: &mut Environment) -> EngineResult<()> {
        let declared = spec.resource_names();
        for (name, resource) in &spec.resources {
            self.bring_up(name, resource, env, &declared).await?;
        }
        Ok(())
    }

    async fn bring_up(
        &self,
        name: &str,
        spec: &ResourceSpec,
        env: &mut Environment,
        declared: &[&str],
    ) -> EngineResult<()> {
        let mut resolved = resolve_resource(name, spec, env, declared, self.ports)?;
        let request = self.container_request(&resolved);

        info!(resource = %name, image = %resolved.image, "creating container");
        let id = self
            .runtime
            .create_container(&request)
            .await
            .map_err(|e| EngineError::orchestration(name, e))?;
        resolved.container = id.clone();
        let host_port = resolved.host_port;
        env.resources.insert(name.to_string(), resolved);

        self.runtime
            .start_container(&id)
            .await
            .map_err(|e| EngineError::orchestration(name, e))?;

        match container_running(self.runtime, &id).await {
            Ok(true) => info!(resource = %name, container = %id, "container running"),
            Ok(false) => warn!(resource = %name, container = %id, "container not running after start"),
            Err(e) => warn!(resource = %name, container = %id, error = %e, "could not check container state"),
        }

        self.readiness.wait_ready(self.runtime, name, &id).await?;
        obs::emit_resource_started(name, &id, host_port);
        Ok(())
    }

    /// Runtime request for a resolved resource. Bindings are included only
    /// when both sides are present.
    pub fn container_request(&self, resource: &ResolvedResource) -> ContainerRequest {
        let mut request = ContainerRequest::new(resource.image.clone());
        if let Some(command) = &resource.command {
            request = request.with_command(command.clone());
        }
        for (key, value) in &resource.environment {
            request = request.with_env(key.clone(), value.clone());
        }
        if let Some(container_port) = resource.cont_port {
            request = request.with_port(container_port, resource.host_port);
        }
        if let Some(container_volume) = &resource.cont_volume {
            request = request.with_volume(container_volume.clone(), resource.host_volume.clone());
        }
        for (key, value) in &self.labels {
            request = request.with_label(key.clone(), value.clone());
        }
        request
    }
}
