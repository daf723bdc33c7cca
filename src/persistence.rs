//! Persistence seam for job results.
//!
//! The orchestration core never defines storage schema; it hands the
//! aggregated [`JobResult`](crate::collector::JobResult) to this trait
//! and records the returned handle on the job. A write failure is
//! fatal to the affected job (the result cannot be considered durable)
//! but is reported as retryable, since orchestration is idempotent
//! with respect to re-submission.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::collector::JobResult;
use crate::job::JobId;

/// Opaque reference to a stored job result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageHandle(String);

impl StorageHandle {
    /// Creates a handle from its string form.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the string form of the handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The write did not durably land.
    #[error("Failed to persist result: {0}")]
    WriteFailed(String),

    /// No result stored under the handle.
    #[error("No stored result for handle '{0}'")]
    NotFound(String),
}

/// External persistence contract.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Durably stores a job result and returns its handle.
    async fn save(&self, job_id: JobId, result: &JobResult) -> Result<StorageHandle, PersistenceError>;

    /// Loads a previously stored result.
    async fn load(&self, handle: &StorageHandle) -> Result<JobResult, PersistenceError>;
}

/// Process-local persistence used by the CLI harness and tests.
#[derive(Default)]
pub struct InMemoryPersistence {
    entries: RwLock<HashMap<String, JobResult>>,
}

impl InMemoryPersistence {
    /// Creates an empty in-memory persistence.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn save(&self, job_id: JobId, result: &JobResult) -> Result<StorageHandle, PersistenceError> {
        let handle = StorageHandle::new(format!("results/{}", job_id));
        self.entries
            .write()
            .await
            .insert(handle.as_str().to_string(), result.clone());
        Ok(handle)
    }

    async fn load(&self, handle: &StorageHandle) -> Result<JobResult, PersistenceError> {
        self.entries
            .read()
            .await
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(handle.as_str().to_string()))
    }
}
