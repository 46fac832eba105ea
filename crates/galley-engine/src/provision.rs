//! Image provisioning: pull or build each declared image.

use galley_core::obs;
use galley_core::{Environment, ImageAction, ImageSpec, ResolvedImage, Spec};
use galley_runtime::{image_exists, ContainerRuntime};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::settings::EngineSettings;

/// Realizes [`ImageSpec`]s against a runtime.
pub struct ImageProvisioner<'a> {
    runtime: &'a dyn ContainerRuntime,
    settings: &'a EngineSettings,
}

impl<'a> ImageProvisioner<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, settings: &'a EngineSettings) -> Self {
        Self { runtime, settings }
    }

    /// Provision every image of `spec` in declaration order.
    ///
    /// Each image is recorded in `env` as soon as it exists, so a later
    /// failure still leaves earlier images visible to cleanup.
    pub async fn provision_all(&self, spec: &Spec, env: &mut Environment) -> EngineResult<()> {
        for (key, image) in &spec.images {
            let resolved = self.provision(image).await?;
            env.images.insert(key.clone(), resolved);
        }
        Ok(())
    }

    /// Provision a single image.
    pub async fn provision(&self, spec: &ImageSpec) -> EngineResult<ResolvedImage> {
        let (image, attempts) = match spec.action {
            ImageAction::Pull => (self.pull(spec).await?, 1),
            ImageAction::Build => self.build(spec).await?,
        };

        obs::emit_image_provisioned(&spec.name, spec.action.name(), &image, attempts);
        Ok(ResolvedImage {
            action: spec.action,
            source: spec.source.clone(),
            name: spec.name.clone(),
            persist: spec.persists(),
            image,
        })
    }

    async fn pull(&self, spec: &ImageSpec) -> EngineResult<String> {
        info!(image = %spec.name, source = %spec.source, "pulling image");
        self.runtime
            .pull_image(&spec.source)
            .await
            .map_err(|e| EngineError::provisioning(&spec.name, e))?;

        tokio::time::sleep(self.settings.settle).await;

        let present = image_exists(self.runtime, &spec.source)
            .await
            .map_err(|e| EngineError::provisioning(&spec.name, e))?;
        if !present {
            return Err(EngineError::provisioning(
                &spec.name,
                format!("`{}` not present after pull", spec.source),
            ));
        }
        Ok(spec.source.clone())
    }

    /// Build with bounded retries; returns the image id and attempts used.
    async fn build(&self, spec: &ImageSpec) -> EngineResult<(String, u32)> {
        let attempts = self.settings.build_attempts();
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            info!(image = %spec.name, context = %spec.source, attempt, "building image");
            match self.build_once(spec).await {
                Ok(id) => return Ok((id, attempt)),
                Err(reason) => {
                    warn!(image = %spec.name, attempt, reason = %reason, "build attempt failed");
                    last_failure = reason;
                }
            }
        }

        Err(EngineError::provisioning(
            &spec.name,
            format!("build failed after {} attempt(s): {}", attempts, last_failure),
        ))
    }

    async fn build_once(&self, spec: &ImageSpec) -> Result<String, String> {
        let id = self
            .runtime
            .build_image(Path::new(&spec.source), &spec.name)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "build reported no image id".to_string())?;

        tokio::time::sleep(self.settings.settle).await;

        match image_exists(self.runtime, &id).await {
            Ok(true) => Ok(id),
            Ok(false) => Err(format!("built image {} not found", id)),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_runtime::MemoryRuntime;

    fn image(action: ImageAction, source: &str, name: &str) -> ImageSpec {
        ImageSpec {
            action,
            source: source.to_string(),
            name: name.to_string(),
            persist: None,
        }
    }

    #[tokio::test]
    async fn test_pull_resolves_to_reference() {
        let runtime = MemoryRuntime::new();
        let settings = EngineSettings::immediate();
        let provisioner = ImageProvisioner::new(&runtime, &settings);

        let resolved = provisioner
            .provision(&image(ImageAction::Pull, "redis:7", "cache"))
            .await
            .unwrap();
        assert_eq!(resolved.image, "redis:7");
        assert!(!resolved.persist);
    }

    #[tokio::test]
    async fn test_pull_without_image_is_fatal() {
        let runtime = MemoryRuntime::new();
        runtime.pull_without_image("ghost");
        let settings = EngineSettings::immediate();

        let err = ImageProvisioner::new(&runtime, &settings)
            .provision(&image(ImageAction::Pull, "ghost", "g"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Provisioning { ref image, .. } if image == "g"));
    }

    #[tokio::test]
    async fn test_build_retries_exactly_once() {
        let runtime = MemoryRuntime::new();
        runtime.fail_builds(1);
        let settings = EngineSettings::immediate();

        let resolved = ImageProvisioner::new(&runtime, &settings)
            .provision(&image(ImageAction::Build, "./app", "app"))
            .await
            .unwrap();
        assert!(resolved.image.starts_with("sha256:"));
        assert_eq!(runtime.call_count("build"), 2);
    }

    #[tokio::test]
    async fn test_build_without_id_is_retried() {
        let runtime = MemoryRuntime::new();
        runtime.builds_without_id(1);
        let settings = EngineSettings::immediate();

        ImageProvisioner::new(&runtime, &settings)
            .provision(&image(ImageAction::Build, "./app", "app"))
            .await
            .unwrap();
        assert_eq!(runtime.call_count("build"), 2);
    }

    #[tokio::test]
    async fn test_second_build_failure_aborts() {
        let runtime = MemoryRuntime::new();
        runtime.fail_builds(2);
        let settings = EngineSettings::immediate();

        let err = ImageProvisioner::new(&runtime, &settings)
            .provision(&image(ImageAction::Build, "./app", "app"))
            .await
            .unwrap_err();
        assert_eq!(runtime.call_count("build"), 2);
        assert!(err.to_string().contains("`app`"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_applied() {
        let runtime = MemoryRuntime::new();
        let settings = EngineSettings::default();
        let start = tokio::time::Instant::now();

        ImageProvisioner::new(&runtime, &settings)
            .provision(&image(ImageAction::Pull, "busybox", "bb"))
            .await
            .unwrap();
        assert!(start.elapsed() >= settings.settle);
    }
}
