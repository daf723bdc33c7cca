//! Command-line interface for eduforge.
//!
//! Provides commands for submitting broad content jobs, running
//! remediation sessions, and inspecting the mode taxonomy.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
