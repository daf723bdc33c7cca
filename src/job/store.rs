//! Job store: the registry mapping job identifiers to job state.
//!
//! The store is the only shared mutable state in the engine and the
//! sole point of synchronization; every mutation is atomic with
//! respect to concurrent readers. It is an injected dependency so a
//! persistent implementation can replace the in-memory one without
//! touching orchestration logic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::persistence::StorageHandle;

use super::state::{Job, JobId, RouteKind, StoreError};

/// Registry of jobs with a create/read/update lifecycle (no delete).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a new pending job and returns a snapshot of it.
    async fn create(&self, route: RouteKind) -> Job;

    /// Returns a snapshot of a job.
    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Marks a job as in progress.
    async fn start(&self, id: JobId) -> Result<(), StoreError>;

    /// Advances a job's progress (monotonic, capped below 100).
    async fn advance_progress(&self, id: JobId, progress: u8) -> Result<(), StoreError>;

    /// Completes a job with its stored result handle.
    async fn complete(&self, id: JobId, handle: StorageHandle) -> Result<(), StoreError>;

    /// Fails a job with an error summary.
    async fn fail(&self, id: JobId, error: String, retryable: bool) -> Result<(), StoreError>;
}

/// Process-local job store backed by an async `RwLock`.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, id: JobId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), StoreError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        f(job)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, route: RouteKind) -> Job {
        let job = Job::new(route);
        let snapshot = job.clone();
        self.jobs.write().await.insert(job.id, job);
        snapshot
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn start(&self, id: JobId) -> Result<(), StoreError> {
        self.mutate(id, |job| job.start()).await
    }

    async fn advance_progress(&self, id: JobId, progress: u8) -> Result<(), StoreError> {
        self.mutate(id, |job| job.advance_progress(progress)).await
    }

    async fn complete(&self, id: JobId, handle: StorageHandle) -> Result<(), StoreError> {
        self.mutate(id, |job| job.complete(handle)).await
    }

    async fn fail(&self, id: JobId, error: String, retryable: bool) -> Result<(), StoreError> {
        self.mutate(id, |job| job.fail(error, retryable)).await
    }
}
