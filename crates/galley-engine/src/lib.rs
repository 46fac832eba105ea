//! Galley Engine
//!
//! Turns a resolved environment description into a live environment, runs
//! the test suite against it and tears it down:
//! - `provision`: pull or build images, with one build retry
//! - `orchestrate`: create and start resources in declaration order
//! - `readiness`: warm-up strategies between resource starts
//! - `runner`: test file discovery and execution
//! - `cleanup`: teardown with a per-step report
//! - `pipeline`: the run coordinator tying the phases together

pub mod cleanup;
pub mod error;
pub mod gate;
pub mod orchestrate;
pub mod phase;
pub mod pipeline;
pub mod provision;
pub mod readiness;
pub mod runner;
pub mod settings;

pub use cleanup::{CleanupAction, CleanupManager, CleanupReport, CleanupStep, StepOutcome};
pub use error::{EngineError, EngineResult};
pub use gate::{GateVerdict, RunGate};
pub use orchestrate::ResourceOrchestrator;
pub use phase::RunPhase;
pub use pipeline::{RunCoordinator, RunReport};
pub use provision::ImageProvisioner;
pub use readiness::{FixedDelay, PollUntilReady, ReadinessCheck};
pub use runner::{CommandTestRunner, TestFileResult, TestRunner, TestTally, DEFAULT_PATTERN};
pub use settings::{EngineSettings, ReadinessStrategy};
