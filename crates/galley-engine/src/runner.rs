//! Test suite execution against a published environment.

use async_trait::async_trait;
use galley_core::context::{PublishedEnvironment, TestReport, ENVIRONMENT_VAR, RESULTS_VAR};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Default test file pattern.
pub const DEFAULT_PATTERN: &str = "galleytest_*";

/// Counts collected from a test suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTally {
    pub tests_run: u64,
    pub failures: u64,
    pub errors: u64,
}

impl TestTally {
    pub fn new(tests_run: u64, failures: u64, errors: u64) -> Self {
        Self {
            tests_run,
            failures,
            errors,
        }
    }

    /// Zero failures and zero errors.
    pub fn passed(&self) -> bool {
        self.failures == 0 && self.errors == 0
    }

    pub fn add(&mut self, other: TestTally) {
        self.tests_run += other.tests_run;
        self.failures += other.failures;
        self.errors += other.errors;
    }
}

impl From<TestReport> for TestTally {
    fn from(report: TestReport) -> Self {
        Self::new(report.tests_run, report.failures, report.errors)
    }
}

/// Runs the test suite with the environment published.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, published: &PublishedEnvironment) -> EngineResult<TestTally>;
}

/// Outcome of one test file.
#[derive(Debug, Clone)]
pub struct TestFileResult {
    pub path: PathBuf,
    pub tally: TestTally,
    /// `None` when the process was not spawned or did not finish.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Discovers test files by glob and runs each as a process.
///
/// Each process sees [`ENVIRONMENT_VAR`] and [`RESULTS_VAR`]. A file that
/// writes a [`TestReport`] to the results path is counted by that report;
/// otherwise its exit status counts as one test.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    root: PathBuf,
    pattern: String,
    interpreter: Option<String>,
    timeout: Option<Duration>,
}

impl CommandTestRunner {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            root: PathBuf::from("."),
            pattern: pattern.into(),
            interpreter: None,
            timeout: None,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Run every file as `interpreter <file>` instead of executing it.
    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Matching files below the root, sorted, skipping hidden directories.
    pub fn discover(&self) -> EngineResult<Vec<PathBuf>> {
        let pattern = format!(
            "{}/**/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            self.pattern
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| EngineError::TestExecution(format!("invalid pattern `{}`: {}", self.pattern, e)))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() && !self.is_hidden(&path) => files.push(path),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "unreadable path during test discovery"),
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_hidden(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut components: Vec<Component<'_>> = relative.components().collect();
        components.pop();
        components.iter().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }

    /// Run a single test file.
    pub async fn run_file(&self, path: &Path, environment: &Path) -> TestFileResult {
        let start = Instant::now();
        let result = |tally: TestTally, exit_code: Option<i32>| TestFileResult {
            path: path.to_path_buf(),
            tally,
            exit_code,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        let results_dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "cannot create results directory");
                return result(TestTally::new(1, 0, 1), None);
            }
        };
        let results_path = results_dir.path().join("results.json");

        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(path);
                command
            }
            // a bare file name would otherwise be looked up on PATH
            None if path.is_relative() => Command::new(Path::new(".").join(path)),
            None => Command::new(path),
        };
        command
            .env(ENVIRONMENT_VAR, environment)
            .env(RESULTS_VAR, &results_path)
            .kill_on_drop(true);

        info!(file = %path.display(), "running test file");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to start test file");
                return result(TestTally::new(1, 0, 1), None);
            }
        };

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(file = %path.display(), timeout_secs = limit.as_secs(), "test file timed out");
                    return result(TestTally::new(1, 0, 1), None);
                }
            },
            None => child.wait().await,
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed waiting for test file");
                return result(TestTally::new(1, 0, 1), None);
            }
        };

        let tally = match read_report(&results_path) {
            Some(report) => report.into(),
            None => TestTally::new(1, u64::from(!status.success()), 0),
        };
        debug!(file = %path.display(), code = ?status.code(), ?tally, "test file finished");
        result(tally, status.code())
    }
}

fn read_report(path: &Path) -> Option<TestReport> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice(&bytes) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed test report");
            None
        }
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, published: &PublishedEnvironment) -> EngineResult<TestTally> {
        let files = self.discover()?;
        if files.is_empty() {
            warn!(pattern = %self.pattern, root = %self.root.display(), "no test files found");
        }

        let mut tally = TestTally::default();
        for file in files {
            let outcome = self.run_file(&file, published.path()).await;
            tally.add(outcome.tally);
        }
        Ok(tally)
    }
}
