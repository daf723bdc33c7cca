//! Prerequisite discovery for foundational gaps.
//!
//! Foundational gaps point below the student's current material, so
//! the planner asks a lookup service which earlier topics (floors) to
//! remediate first. The lookup is a seam; the static implementation
//! serves tests and the CLI harness.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// One prerequisite topic below the gap's level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Floor {
    /// Prerequisite topic code.
    pub topic: String,
    /// Grade level the topic belongs to. The `"previous"` sentinel
    /// means one level below the current material.
    pub grade_level: String,
    /// Remediation priority (1 = highest).
    pub priority: u32,
    /// Human-readable description.
    pub description: String,
}

/// Errors from prerequisite lookups.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The backing service could not be reached.
    #[error("Prerequisite lookup unavailable: {0}")]
    Unavailable(String),
}

/// Discovery seam for prerequisite topics.
#[async_trait]
pub trait PrerequisiteLookup: Send + Sync {
    /// Returns the floors to remediate before a gap's own topic.
    async fn discover(&self, gap_code: &str, grade_level: &str) -> Result<Vec<Floor>, LookupError>;
}

/// Table-driven lookup with a generic fallback floor.
#[derive(Debug, Default)]
pub struct StaticPrerequisiteLookup {
    floors: HashMap<String, Vec<Floor>>,
}

impl StaticPrerequisiteLookup {
    /// Creates an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers floors for a gap code.
    pub fn with_floors(mut self, gap_code: impl Into<String>, floors: Vec<Floor>) -> Self {
        self.floors.insert(gap_code.into(), floors);
        self
    }
}

#[async_trait]
impl PrerequisiteLookup for StaticPrerequisiteLookup {
    async fn discover(&self, gap_code: &str, _grade_level: &str) -> Result<Vec<Floor>, LookupError> {
        if let Some(floors) = self.floors.get(gap_code) {
            return Ok(floors.clone());
        }
        // Unknown gaps still get a generic floor so foundational
        // remediation always has something to build on.
        Ok(vec![Floor {
            topic: "basic_concepts".to_string(),
            grade_level: "previous".to_string(),
            priority: 1,
            description: format!("Fundamental concepts for {}", gap_code),
        }])
    }
}

/// Discovers floors, degrading to the generic fallback on lookup
/// failure rather than failing the remediation.
pub async fn discover_or_fallback(
    lookup: &dyn PrerequisiteLookup,
    gap_code: &str,
    grade_level: &str,
) -> Vec<Floor> {
    match lookup.discover(gap_code, grade_level).await {
        Ok(floors) => floors,
        Err(e) => {
            warn!(gap_code, error = %e, "Prerequisite lookup failed; using fallback floor");
            vec![Floor {
                topic: "basic_concepts".to_string(),
                grade_level: "previous".to_string(),
                priority: 1,
                description: format!("Fundamental concepts for {}", gap_code),
            }]
        }
    }
}
