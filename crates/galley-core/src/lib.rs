//! Galley Core Library
//!
//! Domain model, placeholder resolution and environment publishing shared by
//! the Galley engine and CLI.

pub mod context;
pub mod domain;
pub mod host;
pub mod obs;
pub mod ports;
pub mod resolve;
pub mod telemetry;
pub mod template;

pub use context::{PublishedEnvironment, TestReport, ENVIRONMENT_VAR, RESULTS_VAR};

pub use domain::{
    CommandSpec, ConfigError, Environment, GalleyError, Host, ImageAction, ImageSpec, PortError,
    ResolvedImage, ResolvedResource, ResourceSpec, Result, Scalar, Spec,
};

pub use ports::{EphemeralPortAllocator, PortAllocator};

pub use template::{EnvironSource, ProcessEnviron};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
