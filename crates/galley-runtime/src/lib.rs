//! Galley Runtime: the container engine seam.
//!
//! - `ContainerRuntime`: async trait for the operations Galley performs
//! - `DockerRuntime`: Docker daemon backend (bollard)
//! - `MemoryRuntime`: in-memory fake for tests

pub mod docker;
mod error;
pub mod fakes;
pub mod runtime_traits;

pub use docker::{daemon_address, DaemonAddress, DockerRuntime};
pub use error::{RuntimeError, RuntimeResult};
pub use fakes::MemoryRuntime;
pub use runtime_traits::{
    container_exists, container_running, image_exists, normalize_reference, ContainerRequest,
    ContainerRuntime, ContainerState, ContainerSummary, HealthState, ImageSummary, PortMapping,
    VolumeBind,
};
