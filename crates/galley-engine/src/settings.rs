//! Engine tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::readiness::{FixedDelay, PollUntilReady, ReadinessCheck};

/// How the orchestrator decides a started resource is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStrategy {
    /// Sleep for the warm-up delay.
    FixedDelay,
    /// Poll the container until it runs (and is healthy, if it has a
    /// health check), up to the warm-up delay.
    Poll,
}

/// Timing and retry settings for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Readiness wait after each resource starts.
    pub warmup: Duration,

    /// Pause after a pull or build before checking the image exists.
    pub settle: Duration,

    /// Pause between the last resource start and the test suite.
    pub pre_test: Duration,

    /// Extra build attempts after a failed one.
    pub build_retries: u32,

    pub readiness: ReadinessStrategy,

    /// Interval between readiness polls.
    pub poll_interval: Duration,

    /// Per-file limit for test execution; `None` waits indefinitely.
    pub test_timeout: Option<Duration>,

    /// Connection timeout for the runtime client.
    pub client_timeout: Duration,

    /// Leave everything in place after the run.
    pub no_destroy: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(10),
            settle: Duration::from_secs(5),
            pre_test: Duration::from_secs(5),
            build_retries: 1,
            readiness: ReadinessStrategy::FixedDelay,
            poll_interval: Duration::from_millis(500),
            test_timeout: None,
            client_timeout: Duration::from_secs(30),
            no_destroy: false,
        }
    }
}

impl EngineSettings {
    /// Defaults with every delay set to zero.
    pub fn immediate() -> Self {
        Self {
            warmup: Duration::ZERO,
            settle: Duration::ZERO,
            pre_test: Duration::ZERO,
            poll_interval: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_pre_test(mut self, pre_test: Duration) -> Self {
        self.pre_test = pre_test;
        self
    }

    pub fn with_build_retries(mut self, retries: u32) -> Self {
        self.build_retries = retries;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessStrategy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_test_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    pub fn with_no_destroy(mut self, no_destroy: bool) -> Self {
        self.no_destroy = no_destroy;
        self
    }

    /// Total build attempts per image.
    pub fn build_attempts(&self) -> u32 {
        self.build_retries + 1
    }

    /// Readiness check implementing the configured strategy.
    pub fn readiness_check(&self) -> Box<dyn ReadinessCheck> {
        match self.readiness {
            ReadinessStrategy::FixedDelay => Box::new(FixedDelay::new(self.warmup)),
            ReadinessStrategy::Poll => {
                Box::new(PollUntilReady::new(self.poll_interval, self.warmup))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.warmup, Duration::from_secs(10));
        assert_eq!(settings.settle, Duration::from_secs(5));
        assert_eq!(settings.pre_test, Duration::from_secs(5));
        assert_eq!(settings.build_attempts(), 2);
        assert_eq!(settings.client_timeout, Duration::from_secs(30));
        assert!(!settings.no_destroy);
    }

    #[test]
    fn test_immediate_keeps_retry_policy() {
        let settings = EngineSettings::immediate();
        assert_eq!(settings.warmup, Duration::ZERO);
        assert_eq!(settings.build_attempts(), 2);
    }

    #[test]
    fn test_builder() {
        let settings = EngineSettings::default()
            .with_build_retries(0)
            .with_readiness(ReadinessStrategy::Poll)
            .with_no_destroy(true);
        assert_eq!(settings.build_attempts(), 1);
        assert_eq!(settings.readiness, ReadinessStrategy::Poll);
        assert!(settings.no_destroy);
    }
}
