//! Engine error taxonomy.

use galley_core::GalleyError;
use galley_runtime::RuntimeError;
use thiserror::Error;

/// Fatal errors of a Galley run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The environment description could not be resolved.
    #[error(transparent)]
    Resolution(#[from] GalleyError),

    #[error("failed to provision image `{image}`: {reason}")]
    Provisioning { image: String, reason: String },

    #[error("failed to start resource `{resource}`: {reason}")]
    Orchestration { resource: String, reason: String },

    #[error("test execution failed: {0}")]
    TestExecution(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl EngineError {
    pub fn provisioning(image: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::Provisioning {
            image: image.into(),
            reason: reason.to_string(),
        }
    }

    pub fn orchestration(resource: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::Orchestration {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is a problem in the environment description.
    pub fn is_config(&self) -> bool {
        matches!(self, EngineError::Resolution(e) if e.is_config())
    }

    /// Short category name for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Resolution(e) if e.is_config() => "configuration",
            EngineError::Resolution(_) => "resolution",
            EngineError::Provisioning { .. } => "provisioning",
            EngineError::Orchestration { .. } => "orchestration",
            EngineError::TestExecution(_) => "test_execution",
            EngineError::Runtime(_) => "runtime",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
