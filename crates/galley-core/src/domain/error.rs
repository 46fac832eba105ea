//! Domain-level error taxonomy for Galley.

/// Errors in the declarative environment description.
///
/// Every variant is fatal and is raised before the first runtime call
/// that depends on the offending value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed placeholder `{expr}`: {reason}")]
    MalformedPlaceholder { expr: String, reason: String },

    #[error("unknown placeholder namespace `{namespace}` in `{expr}`")]
    UnknownNamespace { namespace: String, expr: String },

    #[error("placeholder `{expr}` is not allowed in {field}")]
    PlaceholderNotAllowed { expr: String, field: String },

    #[error("environment variable `{name}` is not set")]
    MissingEnvironmentVariable { name: String },

    #[error("placeholder `{expr}` does not resolve: {reason}")]
    Unresolved { expr: String, reason: String },

    #[error("resource `{resource}` references `{referenced}`, which is not declared before it")]
    ForwardReference { resource: String, referenced: String },

    #[error("resource `{resource}` references unknown resource `{referenced}`")]
    UnknownResource { resource: String, referenced: String },

    #[error("resource `{resource}` references unknown image `{reference}`")]
    UnknownImage { resource: String, reference: String },

    #[error("resource `{resource}` image reference `{reference}` matches {count} images")]
    AmbiguousImage {
        resource: String,
        reference: String,
        count: usize,
    },

    #[error("invalid {field} `{value}` for resource `{resource}`")]
    InvalidPort {
        resource: String,
        field: String,
        value: String,
    },

    #[error("value `{value}` still contains placeholders after {limit} passes")]
    TooManyPasses { value: String, limit: usize },
}

/// Errors raised while allocating an ephemeral host port.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("unable to select a free port after {attempts} attempt(s): {reason}")]
    Exhausted { attempts: u32, reason: String },
}

/// Galley domain errors.
#[derive(Debug, thiserror::Error)]
pub enum GalleyError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("port allocation error: {0}")]
    Port(#[from] PortError),

    #[error("invalid environment file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GalleyError {
    /// Whether this error stems from the environment description itself.
    pub fn is_config(&self) -> bool {
        matches!(self, GalleyError::Config(_) | GalleyError::Yaml(_))
    }
}

/// Result type for Galley domain operations.
pub type Result<T> = std::result::Result<T, GalleyError>;
