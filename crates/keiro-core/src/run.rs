//! Run records: one execution of a graph.

use crate::name::{GraphId, RunId};
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The step loop is still executing.
    #[default]
    Running,
    /// The run reached the end of a path.
    Completed,
    /// The run stopped on an error.
    Failed,
}

impl RunStatus {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Returns the lowercase status keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted record of a run.
///
/// The log only grows, and the status only leaves `Running` once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run id.
    pub run_id: RunId,
    /// Graph being executed.
    pub graph_id: GraphId,
    /// Current state payload.
    pub state: State,
    /// Human-readable progress entries, oldest first.
    #[serde(default)]
    pub log: Vec<String>,
    /// Current status.
    #[serde(default)]
    pub status: RunStatus,
}

impl RunRecord {
    /// Creates a running record with an empty log.
    pub fn new(run_id: RunId, graph_id: GraphId, state: State) -> Self {
        Self {
            run_id,
            graph_id,
            state,
            log: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Appends a log entry.
    pub fn push_log(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    /// Marks the run completed. Has no effect on a terminal run.
    pub fn complete(&mut self) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Completed;
        }
    }

    /// Records the failure reason and marks the run failed.
    /// Has no effect on a terminal run.
    pub fn fail(&mut self, reason: impl fmt::Display) {
        if !self.status.is_terminal() {
            self.push_log(reason.to_string());
            self.status = RunStatus::Failed;
        }
    }
}
