//! Run lifecycle phases.

use serde::{Deserialize, Serialize};

/// Phases of a run, strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Loading,
    Resolving,
    Provisioning,
    Orchestrating,
    TestExecution,
    Cleanup,
    Done,
}

impl RunPhase {
    pub fn name(&self) -> &'static str {
        match self {
            RunPhase::Loading => "loading",
            RunPhase::Resolving => "resolving",
            RunPhase::Provisioning => "provisioning",
            RunPhase::Orchestrating => "orchestrating",
            RunPhase::TestExecution => "test_execution",
            RunPhase::Cleanup => "cleanup",
            RunPhase::Done => "done",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
