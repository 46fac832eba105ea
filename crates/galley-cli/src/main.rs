//! Galley CLI
//!
//! `galley [config] [pattern]` provisions the environment described in
//! `config`, runs every test file matching `pattern` against it, and tears
//! the environment down again.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use galley_engine::{
    CommandTestRunner, EngineSettings, ReadinessStrategy, RunCoordinator, RunReport, TestTally,
    DEFAULT_PATTERN,
};
use galley_runtime::{ContainerRuntime, DockerRuntime};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "galley")]
#[command(version = galley_core::VERSION)]
#[command(about = "Disposable multi-container test environments", long_about = None)]
struct Cli {
    /// Environment description
    #[arg(default_value = ".galley.yml")]
    config: PathBuf,

    /// Test file name pattern
    #[arg(default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Leave containers and images in place after the run
    #[arg(long)]
    no_destroy: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Program used to execute each test file (e.g. python3)
    #[arg(long, env = "GALLEY_INTERPRETER")]
    interpreter: Option<String>,

    /// Readiness wait after each resource starts, in seconds
    #[arg(long, env = "GALLEY_WARMUP_SECS", default_value_t = 10)]
    warmup_secs: u64,

    /// Pause after a pull or build before verifying the image, in seconds
    #[arg(long, env = "GALLEY_SETTLE_SECS", default_value_t = 5)]
    settle_secs: u64,

    /// Pause before the test suite starts, in seconds
    #[arg(long, env = "GALLEY_PRE_TEST_SECS", default_value_t = 5)]
    pre_test_secs: u64,

    /// Extra attempts after a failed build
    #[arg(long, env = "GALLEY_BUILD_RETRIES", default_value_t = 1)]
    build_retries: u32,

    /// How to decide a started resource is ready
    #[arg(long, env = "GALLEY_READINESS", value_enum, default_value_t = Readiness::Delay)]
    readiness: Readiness,

    /// Per test file limit, in seconds
    #[arg(long, env = "GALLEY_TEST_TIMEOUT_SECS")]
    test_timeout_secs: Option<u64>,

    /// Container runtime connection timeout, in seconds
    #[arg(long, env = "GALLEY_CLIENT_TIMEOUT_SECS", default_value_t = 30)]
    client_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Readiness {
    /// Sleep for the warm-up delay
    Delay,
    /// Poll container state until running, bounded by the warm-up delay
    Poll,
}

impl From<Readiness> for ReadinessStrategy {
    fn from(value: Readiness) -> Self {
        match value {
            Readiness::Delay => ReadinessStrategy::FixedDelay,
            Readiness::Poll => ReadinessStrategy::Poll,
        }
    }
}

impl Cli {
    fn settings(&self) -> EngineSettings {
        EngineSettings::default()
            .with_warmup(Duration::from_secs(self.warmup_secs))
            .with_settle(Duration::from_secs(self.settle_secs))
            .with_pre_test(Duration::from_secs(self.pre_test_secs))
            .with_build_retries(self.build_retries)
            .with_readiness(self.readiness.into())
            .with_test_timeout(self.test_timeout_secs.map(Duration::from_secs))
            .with_client_timeout(Duration::from_secs(self.client_timeout_secs))
            .with_no_destroy(self.no_destroy)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let started = Instant::now();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    galley_core::init_tracing(cli.json, level);

    let runtime = match DockerRuntime::connect(cli.settings().client_timeout)
        .context("Failed to connect to the container runtime")
    {
        Ok(runtime) => runtime,
        Err(e) => {
            print!("{}", totals(&TestTally::default(), started.elapsed().as_secs_f64()));
            return Err(e);
        }
    };
    info!(daemon = %runtime.address(), "container runtime configured");

    let report = run(&cli, Arc::new(runtime)).await;
    print!("{}", summary(&report));
    Ok(ExitCode::from(report.exit_code() as u8))
}

/// Load, run and tear down the environment named on the command line.
///
/// Every outcome, including an unreadable description, ends in a report.
async fn run(cli: &Cli, runtime: Arc<dyn ContainerRuntime>) -> RunReport {
    let settings = cli.settings();
    let runner = CommandTestRunner::new(cli.pattern.clone())
        .with_interpreter(cli.interpreter.clone())
        .with_timeout(settings.test_timeout);

    RunCoordinator::new(runtime, Arc::new(runner), settings)
        .run_file(&cli.config)
        .await
}

fn totals(tally: &TestTally, elapsed_secs: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Tests Run: {}", tally.tests_run);
    let _ = writeln!(out, "Tests Failed: {}", tally.failures);
    let _ = writeln!(out, "Test Errors: {}", tally.errors);
    let _ = writeln!(out, "Total Elapsed Time: {:.2}s", elapsed_secs);
    out
}

fn summary(report: &RunReport) -> String {
    for warning in &report.verdict.warnings {
        warn!("{}", warning);
    }

    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "Run ID: {}", report.run_id);
    let _ = writeln!(
        out,
        "Status: {}",
        if report.success() { "✓ PASSED" } else { "✗ FAILED" }
    );
    out.push_str(&totals(&report.tally, report.elapsed_secs()));

    if !report.verdict.violations.is_empty() {
        let _ = writeln!(out, "Violations:");
        for violation in &report.verdict.violations {
            let _ = writeln!(out, "  - {}", violation);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_runtime::MemoryRuntime;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["galley"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(".galley.yml"));
        assert_eq!(cli.pattern, "galleytest_*");
        assert!(!cli.no_destroy);

        let settings = cli.settings();
        assert_eq!(settings.warmup, Duration::from_secs(10));
        assert_eq!(settings.settle, Duration::from_secs(5));
        assert_eq!(settings.pre_test, Duration::from_secs(5));
        assert_eq!(settings.build_attempts(), 2);
        assert_eq!(settings.readiness, ReadinessStrategy::FixedDelay);
        assert_eq!(settings.test_timeout, None);
    }

    #[test]
    fn test_positional_and_flags() {
        let cli = Cli::try_parse_from([
            "galley",
            "env/ci.yml",
            "check_*.py",
            "--no-destroy",
            "--interpreter",
            "python3",
            "--readiness",
            "poll",
            "--test-timeout-secs",
            "60",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("env/ci.yml"));
        assert_eq!(cli.pattern, "check_*.py");
        assert_eq!(cli.interpreter.as_deref(), Some("python3"));

        let settings = cli.settings();
        assert!(settings.no_destroy);
        assert_eq!(settings.readiness, ReadinessStrategy::Poll);
        assert_eq!(settings.test_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_delays() {
        let cli = Cli::try_parse_from([
            "galley",
            "--warmup-secs",
            "0",
            "--settle-secs",
            "0",
            "--pre-test-secs",
            "0",
            "--build-retries",
            "0",
        ])
        .unwrap();

        let settings = cli.settings();
        assert_eq!(settings.warmup, Duration::ZERO);
        assert_eq!(settings.build_attempts(), 1);
    }

    #[tokio::test]
    async fn test_missing_config_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("absent.yml");
        let cli = Cli::try_parse_from(["galley", config.to_str().unwrap()]).unwrap();
        let runtime = Arc::new(MemoryRuntime::new());

        let report = run(&cli, runtime.clone()).await;
        assert_eq!(report.exit_code(), 1);
        assert!(runtime.calls().is_empty());

        let text = summary(&report);
        assert!(text.contains("Tests Run: 0"));
        assert!(text.contains("Tests Failed: 0"));
        assert!(text.contains("Test Errors: 0"));
        assert!(text.contains("Total Elapsed Time:"));
        assert!(text.contains("Run aborted"));
    }

    #[tokio::test]
    async fn test_invalid_config_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(".galley.yml");
        std::fs::write(&config, "images: [not, a, mapping]\n").unwrap();
        let cli = Cli::try_parse_from(["galley", config.to_str().unwrap()]).unwrap();

        let report = run(&cli, Arc::new(MemoryRuntime::new())).await;
        assert_eq!(report.exit_code(), 1);
        assert!(summary(&report).contains("Violations:"));
    }
}
