//! Job lifecycle and the process-wide job registry.

pub mod state;
pub mod store;

pub use state::{Job, JobId, JobStatus, RouteKind, StoreError};
pub use store::{InMemoryJobStore, JobStore};
