//! Job state machine.
//!
//! A job is created `pending`, moves to `in_progress` when its graph
//! starts executing, and ends `completed` or `failed`. Terminal states
//! are frozen: any further mutation attempt is a transition error.
//! Progress is monotonically non-decreasing and only reaches 100 when
//! the job completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::persistence::StorageHandle;

/// Unique, opaque job identifier.
pub type JobId = Uuid;

/// Which entry route produced a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Topic-driven generation across many modes.
    Broad,
    /// Student-led, gap-driven remediation.
    Remedial,
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteKind::Broad => write!(f, "broad"),
            RouteKind::Remedial => write!(f, "remedial"),
        }
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, graph execution not started yet.
    Pending,
    /// Graph execution in flight.
    InProgress,
    /// Terminal success; a result reference is recorded.
    Completed,
    /// Terminal failure; an error summary is recorded.
    Failed,
}

impl JobStatus {
    /// Returns whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Errors raised by job state transitions and store lookups.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No job with the given id.
    #[error("Job '{0}' not found")]
    JobNotFound(JobId),

    /// The job already reached a terminal state.
    #[error("Job '{job_id}' is already terminal ({status}); further transitions are rejected")]
    TerminalState { job_id: JobId, status: JobStatus },

    /// Progress would move backwards.
    #[error("Progress for job '{job_id}' cannot regress from {from} to {to}")]
    ProgressRegression { job_id: JobId, from: u8, to: u8 },
}

/// One orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Route that created this job.
    pub route: RouteKind,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Completion progress, 0–100, monotonically non-decreasing.
    pub progress: u8,
    /// Error summary, present only when failed.
    pub error: Option<String>,
    /// Whether a failed job is safe to resubmit (persistence outages).
    #[serde(default)]
    pub retryable: bool,
    /// Reference to the stored result, set only on success.
    pub result: Option<StorageHandle>,
    /// When the job was accepted.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new pending job for a route.
    pub fn new(route: RouteKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            route,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            retryable: false,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn guard_mutable(&self) -> Result<(), StoreError> {
        if self.is_terminal() {
            return Err(StoreError::TerminalState {
                job_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Transitions the job to `in_progress`.
    pub fn start(&mut self) -> Result<(), StoreError> {
        self.guard_mutable()?;
        self.status = JobStatus::InProgress;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Advances progress. Values are clamped to 99 — only completion
    /// sets 100, so a reader observing 100 knows the job completed.
    pub fn advance_progress(&mut self, progress: u8) -> Result<(), StoreError> {
        self.guard_mutable()?;
        let progress = progress.min(99);
        if progress < self.progress {
            return Err(StoreError::ProgressRegression {
                job_id: self.id,
                from: self.progress,
                to: progress,
            });
        }
        self.progress = progress;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transitions to `completed` with the stored result handle.
    pub fn complete(&mut self, handle: StorageHandle) -> Result<(), StoreError> {
        self.guard_mutable()?;
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(handle);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transitions to `failed` with a human-readable summary.
    pub fn fail(&mut self, error: impl Into<String>, retryable: bool) -> Result<(), StoreError> {
        self.guard_mutable()?;
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.retryable = retryable;
        self.updated_at = Utc::now();
        Ok(())
    }
}
