//! Learning mode taxonomy and the static inter-mode dependency table.
//!
//! Every content job is built from a set of modes. Most modes are
//! independent of each other; `assessment` consumes the output of the
//! core content modes that are also present in the request, so it is
//! ordered after them in the task graph.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named content-generation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    /// Reading notes and study material.
    Reading,
    /// Writing exercises.
    Writing,
    /// Curated video content.
    Watching,
    /// Educational games.
    Playing,
    /// Hands-on activities.
    Doing,
    /// Problem sets.
    Solving,
    /// Socratic questioning and debate prompts.
    QuestioningDebating,
    /// Listening and speaking practice.
    ListeningSpeaking,
    /// Mastery assessment over the other modes' output.
    Assessment,
}

impl ModeName {
    /// All known modes, in declaration order.
    pub const ALL: [ModeName; 9] = [
        ModeName::Reading,
        ModeName::Writing,
        ModeName::Watching,
        ModeName::Playing,
        ModeName::Doing,
        ModeName::Solving,
        ModeName::QuestioningDebating,
        ModeName::ListeningSpeaking,
        ModeName::Assessment,
    ];

    /// Returns the wire name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeName::Reading => "reading",
            ModeName::Writing => "writing",
            ModeName::Watching => "watching",
            ModeName::Playing => "playing",
            ModeName::Doing => "doing",
            ModeName::Solving => "solving",
            ModeName::QuestioningDebating => "questioning_debating",
            ModeName::ListeningSpeaking => "listening_speaking",
            ModeName::Assessment => "assessment",
        }
    }

    /// Static dependency table: which other modes this mode depends on,
    /// when those modes are also part of the same request.
    ///
    /// A declared dependency that is absent from the request is simply
    /// ignored; `assessment` with no core content modes present runs
    /// with no dependencies at all.
    pub fn static_dependencies(&self) -> &'static [ModeName] {
        match self {
            ModeName::Assessment => &[ModeName::Reading, ModeName::Solving, ModeName::Writing],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ModeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a mode name string does not match any known mode.
#[derive(Debug, Clone, Error)]
#[error("Unknown mode '{0}'")]
pub struct UnknownModeError(pub String);

impl std::str::FromStr for ModeName {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModeName::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownModeError(s.to_string()))
    }
}

/// An operator-supplied extra dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEdge {
    /// The mode that gains a dependency.
    pub mode: ModeName,
    /// The mode it must wait for.
    pub depends_on: ModeName,
}

/// User-supplied adjustments to the static dependency table.
///
/// Overrides can add edges between requested modes and mark modes as
/// best-effort. Like static dependencies, an override edge whose
/// endpoints are not both requested is ignored. Override edges can
/// introduce cycles; the graph builder rejects those at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyOverrides {
    /// Additional dependency edges.
    #[serde(default)]
    pub edges: Vec<OverrideEdge>,
    /// Modes that may run with a partially-failed dependency set.
    ///
    /// A best-effort mode waits for all its dependencies to reach a
    /// terminal state and runs as long as at least one completed,
    /// receiving only the completed dependencies' artifacts.
    #[serde(default)]
    pub best_effort: Vec<ModeName>,
}

impl DependencyOverrides {
    /// Creates an empty override set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dependency edge.
    pub fn with_edge(mut self, mode: ModeName, depends_on: ModeName) -> Self {
        self.edges.push(OverrideEdge { mode, depends_on });
        self
    }

    /// Marks a mode as best-effort.
    pub fn with_best_effort(mut self, mode: ModeName) -> Self {
        self.best_effort.push(mode);
        self
    }

    /// Parses overrides from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mode_round_trip() {
        for mode in ModeName::ALL {
            let parsed = ModeName::from_str(mode.as_str()).expect("should parse");
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_unknown_mode() {
        let err = ModeName::from_str("learn_by_osmosis").unwrap_err();
        assert!(err.to_string().contains("learn_by_osmosis"));
    }

    #[test]
    fn test_assessment_dependencies() {
        let deps = ModeName::Assessment.static_dependencies();
        assert!(deps.contains(&ModeName::Reading));
        assert!(deps.contains(&ModeName::Solving));
        assert!(deps.contains(&ModeName::Writing));
        assert!(!deps.contains(&ModeName::Watching));
    }

    #[test]
    fn test_core_modes_have_no_dependencies() {
        for mode in ModeName::ALL {
            if mode != ModeName::Assessment {
                assert!(mode.static_dependencies().is_empty(), "{} should be independent", mode);
            }
        }
    }

    #[test]
    fn test_mode_serde_wire_names() {
        let json = serde_json::to_string(&ModeName::QuestioningDebating).unwrap();
        assert_eq!(json, "\"questioning_debating\"");

        let mode: ModeName = serde_json::from_str("\"listening_speaking\"").unwrap();
        assert_eq!(mode, ModeName::ListeningSpeaking);
    }

    #[test]
    fn test_overrides_from_yaml() {
        let yaml = r#"
edges:
  - mode: assessment
    depends_on: watching
best_effort:
  - assessment
"#;
        let overrides = DependencyOverrides::from_yaml(yaml).expect("should parse");
        assert_eq!(overrides.edges.len(), 1);
        assert_eq!(overrides.edges[0].mode, ModeName::Assessment);
        assert_eq!(overrides.edges[0].depends_on, ModeName::Watching);
        assert_eq!(overrides.best_effort, vec![ModeName::Assessment]);
    }

    #[test]
    fn test_overrides_builder() {
        let overrides = DependencyOverrides::new()
            .with_edge(ModeName::Solving, ModeName::Reading)
            .with_best_effort(ModeName::Solving);

        assert_eq!(overrides.edges.len(), 1);
        assert_eq!(overrides.best_effort, vec![ModeName::Solving]);
    }
}
