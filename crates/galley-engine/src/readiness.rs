//! Readiness checks run after each resource starts.

use async_trait::async_trait;
use galley_runtime::{ContainerRuntime, HealthState};
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Decides when a started container may be depended on.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn wait_ready(
        &self,
        runtime: &dyn ContainerRuntime,
        resource: &str,
        container: &str,
    ) -> EngineResult<()>;
}

/// Sleep for a fixed warm-up delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ReadinessCheck for FixedDelay {
    async fn wait_ready(
        &self,
        _runtime: &dyn ContainerRuntime,
        resource: &str,
        _container: &str,
    ) -> EngineResult<()> {
        debug!(resource = %resource, delay_ms = self.delay.as_millis() as u64, "warming up");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Poll until the container is running and, if it has a health check,
/// healthy.
#[derive(Debug, Clone, Copy)]
pub struct PollUntilReady {
    interval: Duration,
    timeout: Duration,
}

impl PollUntilReady {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[async_trait]
impl ReadinessCheck for PollUntilReady {
    async fn wait_ready(
        &self,
        runtime: &dyn ContainerRuntime,
        resource: &str,
        container: &str,
    ) -> EngineResult<()> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            let state = runtime
                .inspect_container(container)
                .await
                .map_err(|e| EngineError::orchestration(resource, e))?;

            match state.health {
                Some(HealthState::Unhealthy) => {
                    return Err(EngineError::orchestration(resource, "container is unhealthy"));
                }
                Some(HealthState::Healthy) if state.running => return Ok(()),
                None if state.running => return Ok(()),
                _ => {}
            }
            if matches!(state.status.as_str(), "exited" | "dead") {
                return Err(EngineError::orchestration(
                    resource,
                    format!("container {}", state.status),
                ));
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::orchestration(
                    resource,
                    format!("not ready after {}s", self.timeout.as_secs()),
                ));
            }
            debug!(resource = %resource, status = %state.status, "waiting for readiness");
            tokio::time::sleep(self.interval).await;
        }
    }
}
