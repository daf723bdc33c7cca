//! Task graph construction for content jobs.
//!
//! - [`Task`] / [`TaskStatus`]: units of work and their lifecycle
//! - [`TaskGraphBuilder`]: pure construction with dependency ordering
//! - [`TaskGraph`]: immutable graph plus the initial ready set

pub mod builder;
pub mod task;

pub use builder::{GraphError, TaskGraph, TaskGraphBuilder};
pub use task::{Task, TaskStatus};
