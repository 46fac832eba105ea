//! Pass/fail evaluation of a finished run.

use serde::{Deserialize, Serialize};

use crate::cleanup::CleanupReport;
use crate::runner::TestTally;

/// Gate evaluation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub passed: bool,

    /// Reasons the run failed (empty if passed).
    pub violations: Vec<String>,

    /// Non-fatal problems worth reporting.
    pub warnings: Vec<String>,

    pub message: String,
}

impl GateVerdict {
    /// Process exit status for this verdict.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

/// Run gate rules.
pub struct RunGate;

impl RunGate {
    /// A run passes only with no fatal error, zero failures and zero errors.
    /// Cleanup failures never fail the run; they become warnings.
    pub fn evaluate(
        fatal: Option<&str>,
        tally: &TestTally,
        cleanup: Option<&CleanupReport>,
    ) -> GateVerdict {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        if let Some(error) = fatal {
            violations.push(format!("Run aborted: {}", error));
        }
        if tally.failures > 0 {
            violations.push(format!("{} test(s) failed", tally.failures));
        }
        if tally.errors > 0 {
            violations.push(format!("{} test(s) errored", tally.errors));
        }
        if let Some(report) = cleanup {
            for step in report.failures() {
                warnings.push(format!("Cleanup {} {} failed", step.action.name(), step.target));
            }
        }

        let passed = violations.is_empty();
        let message = if passed {
            format!("All {} test(s) passed", tally.tests_run)
        } else {
            format!("Run failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            warnings,
            message,
        }
    }
}
