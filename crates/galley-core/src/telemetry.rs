//! Log output for a Galley run.
//!
//! Stdout belongs to the run summary, so every log line goes to stderr.
//! `--json` switches to newline-delimited JSON for CI log collectors and
//! `-v` raises Galley's own crates to debug. Docker client chatter from
//! `bollard` and `hyper` stays at warn unless `RUST_LOG` asks for more.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const GALLEY_TARGETS: &[&str] = &["galley", "galley_core", "galley_runtime", "galley_engine"];

/// Filter used when `RUST_LOG` is unset: `level` for Galley, warn elsewhere.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(GALLEY_TARGETS.iter().map(|target| format!("{}={}", target, level)));
    directives.join(",")
}

/// Install the global subscriber. Only the first call in a process has an effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
