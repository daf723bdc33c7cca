//! Task definitions for the graph builder and executor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modes::ModeName;

/// Status of one task within a job's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Ready to run, no unmet dependencies.
    Queued,
    /// Waiting on at least one dependency to complete.
    WaitingDependencies,
    /// Producer invocation in flight.
    Running,
    /// Producer returned an artifact.
    Completed,
    /// Producer failed, or a dependency failed and the failure cascaded.
    Failed,
}

impl TaskStatus {
    /// Returns whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::WaitingDependencies => write!(f, "waiting_dependencies"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One unit of work bound to exactly one mode producer within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: Uuid,
    /// The mode this task produces content for.
    pub mode: ModeName,
    /// Current status.
    pub status: TaskStatus,
    /// Tasks that must be completed before this one may run.
    pub dependencies: Vec<Uuid>,
    /// Whether this task may run with a partially-failed dependency set.
    pub best_effort: bool,
}

impl Task {
    /// Creates a new task for a mode with the given dependencies.
    pub fn new(mode: ModeName, dependencies: Vec<Uuid>) -> Self {
        let status = if dependencies.is_empty() {
            TaskStatus::Queued
        } else {
            TaskStatus::WaitingDependencies
        };
        Self {
            id: Uuid::new_v4(),
            mode,
            status,
            dependencies,
            best_effort: false,
        }
    }

    /// Marks the task as best-effort.
    pub fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    /// Returns whether the task has no dependencies.
    pub fn is_ready(&self) -> bool {
        self.dependencies.is_empty()
    }
}
