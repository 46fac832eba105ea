//! Teardown of everything a run created.

use galley_core::{obs, Environment};
use galley_runtime::{ContainerRuntime, RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Signal sent when a graceful stop fails.
pub const KILL_SIGNAL: &str = "SIGKILL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    StopContainer,
    KillContainer,
    RemoveContainer,
    RemoveImage,
}

impl CleanupAction {
    pub fn name(&self) -> &'static str {
        match self {
            CleanupAction::StopContainer => "stop_container",
            CleanupAction::KillContainer => "kill_container",
            CleanupAction::RemoveContainer => "remove_container",
            CleanupAction::RemoveImage => "remove_image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum StepOutcome {
    Done,
    /// Target did not exist; nothing to do.
    AlreadyGone,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStep {
    pub action: CleanupAction,
    pub target: String,
    pub outcome: StepOutcome,
}

/// Everything cleanup did, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub skipped: bool,
    pub steps: Vec<CleanupStep>,
}

impl CleanupReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            steps: Vec::new(),
        }
    }

    /// Steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = &CleanupStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }

    fn record(&mut self, action: CleanupAction, target: &str, result: RuntimeResult<()>) -> bool {
        let outcome = match result {
            Ok(()) => StepOutcome::Done,
            Err(RuntimeError::NotFound { .. }) => StepOutcome::AlreadyGone,
            Err(e) => StepOutcome::Failed(e.to_string()),
        };
        match &outcome {
            StepOutcome::Done => obs::emit_cleanup_step(action.name(), target, None),
            StepOutcome::AlreadyGone => {
                debug!(action = action.name(), target = %target, "already gone")
            }
            StepOutcome::Failed(e) => {
                obs::emit_cleanup_step(action.name(), target, Some(e as &dyn std::fmt::Display))
            }
        }
        let ok = !matches!(outcome, StepOutcome::Failed(_));
        self.steps.push(CleanupStep {
            action,
            target: target.to_string(),
            outcome,
        });
        ok
    }
}

/// Reverses orchestration and provisioning.
pub struct CleanupManager<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> CleanupManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Stop and remove every created container (reverse declaration
    /// order), then remove every image that does not persist.
    ///
    /// Never fails: individual failures are recorded in the report and the
    /// remaining steps still run. With `skip` nothing is touched.
    pub async fn clean(&self, env: &Environment, skip: bool) -> CleanupReport {
        if skip {
            info!(
                containers = env.containers().count(),
                images = env.images.len(),
                "cleanup skipped; environment left in place"
            );
            return CleanupReport::skipped();
        }

        let mut report = CleanupReport::default();
        let containers: Vec<(&str, &str)> = env.containers().collect();

        for (name, id) in containers.into_iter().rev() {
            info!(resource = %name, container = %id, "removing container");
            let stopped = self.runtime.stop_container(id).await;
            let gone = matches!(stopped, Err(RuntimeError::NotFound { .. }));
            if !report.record(CleanupAction::StopContainer, id, stopped) {
                let killed = self.runtime.kill_container(id, KILL_SIGNAL).await;
                report.record(CleanupAction::KillContainer, id, killed);
            }
            if !gone {
                let removed = self.runtime.remove_container(id).await;
                report.record(CleanupAction::RemoveContainer, id, removed);
            }
        }

        for (key, image) in &env.images {
            if image.persist {
                info!(image = %key, "keeping persistent image");
                continue;
            }
            info!(image = %key, reference = %image.image, "removing image");
            let removed = self.runtime.remove_image(&image.image).await;
            report.record(CleanupAction::RemoveImage, &image.image, removed);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::{Host, ImageAction, ResolvedImage, ResolvedResource};
    use galley_runtime::{ContainerRequest, MemoryRuntime};

    async fn environment(runtime: &MemoryRuntime, persist: bool) -> Environment {
        runtime.pull_image("busybox").await.unwrap();
        let mut env = Environment::new(Host::new("127.0.0.1"), Default::default());
        env.images.insert(
            "bb".to_string(),
            ResolvedImage {
                action: ImageAction::Pull,
                source: "busybox".to_string(),
                name: "bb".to_string(),
                persist,
                image: "busybox".to_string(),
            },
        );
        for name in ["db", "app"] {
            let id = runtime
                .create_container(&ContainerRequest::new("busybox"))
                .await
                .unwrap();
            runtime.start_container(&id).await.unwrap();
            env.resources.insert(
                name.to_string(),
                ResolvedResource {
                    image: "busybox".to_string(),
                    cont_port: None,
                    host_port: None,
                    cont_volume: None,
                    host_volume: None,
                    command: None,
                    environment: Default::default(),
                    container: id,
                },
            );
        }
        env
    }

    #[tokio::test]
    async fn test_clean_removes_everything_in_reverse() {
        let runtime = MemoryRuntime::new();
        let env = environment(&runtime, false).await;
        let report = CleanupManager::new(&runtime).clean(&env, false).await;

        assert!(report.is_clean());
        assert!(runtime.live_containers().is_empty());
        assert_eq!(runtime.image_count(), 0);

        let app = &env.resources["app"].container;
        assert_eq!(report.steps[0].target, *app);
        assert_eq!(report.steps.last().unwrap().action, CleanupAction::RemoveImage);
    }

    #[tokio::test]
    async fn test_persistent_image_survives() {
        let runtime = MemoryRuntime::new();
        let env = environment(&runtime, true).await;
        CleanupManager::new(&runtime).clean(&env, false).await;

        assert!(runtime.live_containers().is_empty());
        assert_eq!(runtime.image_tags(), vec!["busybox:latest"]);
    }

    #[tokio::test]
    async fn test_second_cleanup_adds_no_failures() {
        let runtime = MemoryRuntime::new();
        let env = environment(&runtime, false).await;
        let manager = CleanupManager::new(&runtime);

        assert!(manager.clean(&env, false).await.is_clean());
        let second = manager.clean(&env, false).await;
        assert!(second.is_clean());
        assert!(second
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::AlreadyGone));
    }

    #[tokio::test]
    async fn test_stop_failure_falls_back_to_kill() {
        let runtime = MemoryRuntime::new();
        let env = environment(&runtime, false).await;
        runtime.fail_stops();

        let report = CleanupManager::new(&runtime).clean(&env, false).await;
        assert_eq!(runtime.call_count("kill"), 2);
        assert!(runtime.live_containers().is_empty());
        // the failed stops are reported, nothing else
        assert_eq!(report.failure_count(), 2);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_cleanup() {
        let runtime = MemoryRuntime::new();
        let env = environment(&runtime, false).await;
        runtime.fail_image_removal("busybox");

        let report = CleanupManager::new(&runtime).clean(&env, false).await;
        assert_eq!(report.failure_count(), 1);
        assert!(runtime.live_containers().is_empty());
    }

    #[tokio::test]
    async fn test_skip_touches_nothing() {
        let runtime = MemoryRuntime::new();
        let env = environment(&runtime, false).await;
        let calls_before = runtime.calls().len();

        let report = CleanupManager::new(&runtime).clean(&env, true).await;
        assert!(report.skipped);
        assert_eq!(runtime.calls().len(), calls_before);
        assert_eq!(runtime.live_containers().len(), 2);
    }
}
