//! Result aggregation.
//!
//! After a graph run, the collector folds per-task outcomes into one
//! [`JobResult`]: completed artifacts keyed by mode plus a failure
//! entry per mode that did not complete. A partially failed result is
//! still persisted; callers decide from the completion policy whether
//! it counts as success.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::ExecutionResult;
use crate::job::JobId;
use crate::modes::ModeName;
use crate::persistence::{Persistence, PersistenceError, StorageHandle};
use crate::producer::Artifact;

/// A mode that did not produce an artifact, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMode {
    /// The mode that failed.
    pub mode: ModeName,
    /// Producer error or cascade reason.
    pub error: String,
}

/// Aggregated outcome of one job's graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Job this result belongs to.
    pub job_id: JobId,
    /// Completed artifacts, one per mode.
    pub artifacts: HashMap<ModeName, Artifact>,
    /// Modes that failed, with reasons.
    pub failed_modes: Vec<FailedMode>,
    /// When the result was aggregated.
    pub generated_at: DateTime<Utc>,
}

impl JobResult {
    /// Creates an empty result for a job.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            artifacts: HashMap::new(),
            failed_modes: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Returns whether every mode produced an artifact.
    pub fn is_complete(&self) -> bool {
        self.failed_modes.is_empty()
    }

    /// Human-readable summary of failed modes, if any failed.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failed_modes.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .failed_modes
            .iter()
            .map(|f| format!("{}: {}", f.mode, f.error))
            .collect();
        Some(parts.join("; "))
    }
}

/// Folds execution outcomes into job results and persists them.
pub struct Collector {
    persistence: Arc<dyn Persistence>,
}

impl Collector {
    /// Creates a collector over a persistence backend.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Aggregates per-task outcomes into a [`JobResult`].
    pub fn collect(&self, job_id: JobId, execution: &ExecutionResult) -> JobResult {
        let mut result = JobResult::new(job_id);
        for exec in execution.executions.values() {
            match &exec.artifact {
                Some(artifact) => {
                    result.artifacts.insert(exec.mode, artifact.clone());
                }
                None => result.failed_modes.push(FailedMode {
                    mode: exec.mode,
                    error: exec
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                }),
            }
        }
        debug!(
            %job_id,
            artifacts = result.artifacts.len(),
            failed = result.failed_modes.len(),
            "Collected job result"
        );
        result
    }

    /// Persists a result and returns its storage handle.
    pub async fn persist(
        &self,
        job_id: JobId,
        result: &JobResult,
    ) -> Result<StorageHandle, PersistenceError> {
        self.persistence.save(job_id, result).await
    }
}
