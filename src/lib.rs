//! eduforge: Job orchestration engine for multi-mode educational content.
//!
//! This library builds dependency graphs over requested learning modes,
//! executes their producers concurrently, and drives gap-driven
//! remediation spirals with per-job status tracking.

// Core modules
pub mod cli;
pub mod collector;
pub mod config;
pub mod executor;
pub mod graph;
pub mod job;
pub mod modes;
pub mod orchestrator;
pub mod persistence;
pub mod producer;
pub mod remedy;

// Re-export commonly used error types
pub use config::ConfigError;
pub use graph::GraphError;
pub use job::StoreError;
pub use modes::UnknownModeError;
pub use orchestrator::OrchestratorError;
pub use persistence::PersistenceError;
pub use producer::ProducerError;
