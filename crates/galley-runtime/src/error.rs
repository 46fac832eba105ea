//! Error types for galley-runtime

use thiserror::Error;

/// Errors reported by a container runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime endpoint could not be reached or configured.
    #[error("cannot connect to container runtime at {target}: {reason}")]
    Connection { target: String, reason: String },

    /// The referenced image or container does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An image build did not succeed.
    #[error("image build of {context} failed: {reason}")]
    BuildFailed { context: String, reason: String },

    /// Any other failure reported by the runtime.
    #[error("container runtime error: {0}")]
    Api(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the target of the call did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }

    /// Classify a Docker API error for a call on `kind` `id`.
    pub(crate) fn from_docker(err: bollard::errors::Error, kind: &'static str, id: &str) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => RuntimeError::not_found(kind, id),
            other => RuntimeError::Api(other.to_string()),
        }
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        RuntimeError::Api(err.to_string())
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
