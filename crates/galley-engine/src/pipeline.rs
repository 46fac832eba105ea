//! Run coordination: resolve, provision, orchestrate, test, clean up.

use chrono::{DateTime, Utc};
use galley_core::context::PublishedEnvironment;
use galley_core::resolve::{resolve_environ, testparams, validate};
use galley_core::{
    obs, EnvironSource, Environment, EphemeralPortAllocator, Host, PortAllocator, ProcessEnviron,
    Spec,
};
use galley_runtime::ContainerRuntime;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::cleanup::{CleanupManager, CleanupReport};
use crate::error::{EngineError, EngineResult};
use crate::gate::{GateVerdict, RunGate};
use crate::orchestrate::{ResourceOrchestrator, CONFIG_LABEL, RUN_LABEL};
use crate::phase::RunPhase;
use crate::provision::ImageProvisioner;
use crate::runner::{TestRunner, TestTally};
use crate::settings::EngineSettings;

/// Result of a complete run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,

    /// Digest of the environment description (empty if it never loaded).
    pub config_digest: String,

    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Last phase entered before the run finished.
    pub phase: RunPhase,

    pub tally: TestTally,

    /// The error that aborted the run, if any.
    pub fatal: Option<EngineError>,

    /// `None` when nothing had been created yet.
    pub cleanup: Option<CleanupReport>,

    /// Everything provisioned and created, as far as the run got.
    pub environment: Option<Environment>,

    pub verdict: GateVerdict,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.verdict.passed
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// Drives a run through every [`RunPhase`].
pub struct RunCoordinator {
    runtime: Arc<dyn ContainerRuntime>,
    runner: Arc<dyn TestRunner>,
    ports: Arc<dyn PortAllocator>,
    environ: Arc<dyn EnvironSource>,
    host: Option<Host>,
    settings: EngineSettings,
}

impl RunCoordinator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        runner: Arc<dyn TestRunner>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            runtime,
            runner,
            ports: Arc::new(EphemeralPortAllocator::new()),
            environ: Arc::new(ProcessEnviron),
            host: None,
            settings,
        }
    }

    pub fn with_ports(mut self, ports: Arc<dyn PortAllocator>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_environ(mut self, environ: Arc<dyn EnvironSource>) -> Self {
        self.environ = environ;
        self
    }

    /// Use fixed host facts instead of detecting them.
    pub fn with_host(mut self, host: Host) -> Self {
        self.host = Some(host);
        self
    }

    /// Load the description at `path` and run it.
    pub async fn run_file(&self, path: &Path) -> RunReport {
        let mut run = RunState::new();
        run.enter(RunPhase::Loading);
        match Spec::load(path) {
            Ok(spec) => self.execute(run, &spec).await,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot load environment description");
                run.fatal = Some(e.into());
                run.finish()
            }
        }
    }

    /// Run an already loaded description.
    pub async fn run(&self, spec: &Spec) -> RunReport {
        let mut run = RunState::new();
        run.enter(RunPhase::Loading);
        self.execute(run, spec).await
    }

    async fn execute(&self, run: RunState, declared: &Spec) -> RunReport {
        let span = obs::run_span(&run.run_id);
        self.execute_in_span(run, declared).instrument(span).await
    }

    async fn execute_in_span(&self, mut run: RunState, declared: &Spec) -> RunReport {
        run.config_digest = declared.digest().unwrap_or_default();
        obs::emit_run_started(&run.run_id, &run.config_digest);

        run.enter(RunPhase::Resolving);
        let spec = match self.resolve(declared) {
            Ok(spec) => spec,
            Err(e) => {
                error!(error = %e, "configuration error");
                run.fatal = Some(e);
                return run.finish();
            }
        };

        let host = self.host.clone().unwrap_or_else(Host::detect);
        info!(host_ip = %host.ip, "host detected");
        let mut env = Environment::new(host, testparams(&spec));

        if let Err(e) = self.setup(&mut run, &spec, &mut env).await {
            error!(kind = e.kind(), error = %e, "run aborted");
            run.fatal = Some(e);
        } else {
            run.enter(RunPhase::TestExecution);
            match self.test(&env).await {
                Ok(tally) => run.tally = tally,
                Err(e) => {
                    error!(error = %e, "test execution failed");
                    run.fatal = Some(e);
                }
            }
        }

        run.enter(RunPhase::Cleanup);
        let report = CleanupManager::new(self.runtime.as_ref())
            .clean(&env, self.settings.no_destroy)
            .await;
        run.cleanup = Some(report);
        run.environment = Some(env);
        run.finish()
    }

    fn resolve(&self, declared: &Spec) -> EngineResult<Spec> {
        let spec = resolve_environ(declared, self.environ.as_ref())?;
        validate(&spec)?;
        Ok(spec)
    }

    async fn setup(&self, run: &mut RunState, spec: &Spec, env: &mut Environment) -> EngineResult<()> {
        run.enter(RunPhase::Provisioning);
        ImageProvisioner::new(self.runtime.as_ref(), &self.settings)
            .provision_all(spec, env)
            .await?;

        run.enter(RunPhase::Orchestrating);
        let readiness = self.settings.readiness_check();
        ResourceOrchestrator::new(self.runtime.as_ref(), self.ports.as_ref(), readiness.as_ref())
            .with_label(RUN_LABEL, run.run_id.clone())
            .with_label(CONFIG_LABEL, run.config_digest.clone())
            .orchestrate_all(spec, env)
            .await?;

        tokio::time::sleep(self.settings.pre_test).await;
        Ok(())
    }

    async fn test(&self, env: &Environment) -> EngineResult<TestTally> {
        let published = PublishedEnvironment::publish(env.clone())?;
        info!(path = %published.path().display(), "environment published");
        let tally = self.runner.run(&published).await;
        published.unpublish();
        tally
    }
}

/// Mutable bookkeeping for one run.
struct RunState {
    run_id: String,
    config_digest: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    phase: RunPhase,
    tally: TestTally,
    fatal: Option<EngineError>,
    cleanup: Option<CleanupReport>,
    environment: Option<Environment>,
}

impl RunState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            config_digest: String::new(),
            started_at: Utc::now(),
            clock: Instant::now(),
            phase: RunPhase::Loading,
            tally: TestTally::default(),
            fatal: None,
            cleanup: None,
            environment: None,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        self.phase = phase;
        obs::emit_run_phase(&self.run_id, phase.name());
    }

    fn finish(mut self) -> RunReport {
        let reached = self.phase;
        self.enter(RunPhase::Done);
        let duration_ms = self.clock.elapsed().as_millis() as u64;
        let fatal_message = self.fatal.as_ref().map(|e| e.to_string());
        let verdict = RunGate::evaluate(fatal_message.as_deref(), &self.tally, self.cleanup.as_ref());
        obs::emit_run_finished(&self.run_id, duration_ms, self.tally.tests_run, verdict.passed);

        RunReport {
            run_id: self.run_id,
            config_digest: self.config_digest,
            started_at: self.started_at,
            duration_ms,
            phase: reached,
            tally: self.tally,
            fatal: self.fatal,
            cleanup: self.cleanup,
            environment: self.environment,
            verdict,
        }
    }
}
