//! Structured lifecycle events for a Galley run.
//!
//! Every function logs one `info!` (or `warn!`) record with an `event`
//! field so JSON output can be filtered by event name.

use tracing::{info, warn};

/// Span tagging everything inside a run with its id.
///
/// Attach to the run future with `tracing::Instrument` so the future stays
/// `Send`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("galley.run", run_id = %run_id)
}

/// Run started for the config with the given digest.
pub fn emit_run_started(run_id: &str, config_digest: &str) {
    info!(event = "run.started", run_id = %run_id, config_digest = %config_digest);
}

/// The run entered a new phase.
pub fn emit_run_phase(run_id: &str, phase: &str) {
    info!(event = "run.phase", run_id = %run_id, phase = %phase);
}

/// An image is available under runtime identifier `image`.
pub fn emit_image_provisioned(name: &str, action: &str, image: &str, attempts: u32) {
    info!(
        event = "image.provisioned",
        name = %name,
        action = %action,
        image = %image,
        attempts = attempts,
    );
}

/// A resource container was created and started.
pub fn emit_resource_started(name: &str, container: &str, host_port: Option<u16>) {
    info!(
        event = "resource.started",
        resource = %name,
        container = %container,
        host_port = ?host_port,
    );
}

/// One cleanup action completed (or failed, with `error`).
pub fn emit_cleanup_step(action: &str, target: &str, error: Option<&dyn std::fmt::Display>) {
    match error {
        None => info!(event = "cleanup.step", action = %action, target = %target, ok = true),
        Some(e) => warn!(
            event = "cleanup.step",
            action = %action,
            target = %target,
            ok = false,
            error = %e,
        ),
    }
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, tests_run: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        tests_run = tests_run,
        success = success,
    );
}
