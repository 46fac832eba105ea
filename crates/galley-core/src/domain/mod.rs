//! Galley domain model.
//!
//! - [`spec`]: the declarative description as loaded from YAML
//! - [`resolved`]: the realized Environment Aggregate
//! - [`error`]: error taxonomy

pub mod error;
pub mod resolved;
pub mod spec;

pub use error::{ConfigError, GalleyError, PortError, Result};
pub use resolved::{Environment, Host, ResolvedImage, ResolvedResource};
pub use spec::{CommandSpec, ImageAction, ImageSpec, ResourceSpec, Scalar, Spec};
