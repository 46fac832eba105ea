//! Publishing the resolved [`Environment`] to test code.
//!
//! The run owns a [`PublishedEnvironment`] for the duration of test
//! execution. Test processes find the aggregate through the file named by
//! [`ENVIRONMENT_VAR`] and may report their outcome to the file named by
//! [`RESULTS_VAR`].

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::domain::error::Result;
use crate::domain::resolved::Environment;

/// Variable holding the path of the aggregate JSON file.
pub const ENVIRONMENT_VAR: &str = "GALLEY_ENVIRONMENT";

/// Variable holding the path a test file may write its [`TestReport`] to.
pub const RESULTS_VAR: &str = "GALLEY_RESULTS";

/// The environment aggregate, readable by test code while the run lasts.
///
/// Dropping or [`unpublish`](Self::unpublish)ing removes the backing file.
#[derive(Debug)]
pub struct PublishedEnvironment {
    environment: Environment,
    file: NamedTempFile,
}

impl PublishedEnvironment {
    /// Write `environment` to a fresh temporary file.
    pub fn publish(environment: Environment) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("galley-env-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(&mut file, &environment)?;
        file.flush()?;
        Ok(Self { environment, file })
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Path exported as [`ENVIRONMENT_VAR`].
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Withdraw the published file and hand back the aggregate.
    pub fn unpublish(self) -> Environment {
        let Self { environment, file } = self;
        if let Err(e) = file.close() {
            tracing::warn!(error = %e, "failed to remove published environment file");
        }
        environment
    }
}

/// Read an aggregate from a published file.
pub fn load(path: &Path) -> Result<Environment> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// The aggregate of the run this process was started by, if any.
pub fn current() -> Result<Option<Environment>> {
    match std::env::var_os(ENVIRONMENT_VAR) {
        Some(path) => load(Path::new(&path)).map(Some),
        None => Ok(None),
    }
}

/// Outcome a test file reports through [`RESULTS_VAR`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub tests_run: u64,
    pub failures: u64,
    pub errors: u64,
}

impl TestReport {
    /// Write this report where the running Galley expects it.
    ///
    /// Returns the path written to, or `None` when not started by Galley.
    pub fn write_current(&self) -> Result<Option<PathBuf>> {
        let Some(path) = std::env::var_os(RESULTS_VAR).map(PathBuf::from) else {
            return Ok(None);
        };
        std::fs::write(&path, serde_json::to_vec(self)?)?;
        Ok(Some(path))
    }
}
