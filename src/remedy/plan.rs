//! Remediation strategy planning.
//!
//! Maps a classified gap to a checkpointed mode sequence plus content
//! specifications for the producers. Assessment checkpoints are
//! interleaved after every content mode so each loop of the spiral
//! yields a fresh mastery signal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::modes::ModeName;

use super::gap::{ClassifiedGap, GapCategory};
use super::prerequisites::Floor;

/// Plan for remediating one gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPlan {
    /// Category the plan targets.
    pub category: GapCategory,
    /// Ordered mode sequence with assessment checkpoints interleaved.
    pub mode_sequence: Vec<ModeName>,
    /// Producer-facing content specifications.
    pub specifications: Value,
    /// Relative priority among sibling plans (1 = highest).
    pub priority: u32,
    /// Estimated time to work through the sequence, in minutes.
    pub estimated_duration_minutes: u32,
}

impl RemediationPlan {
    /// Distinct modes in sequence order, for graph construction.
    pub fn unique_modes(&self) -> Vec<ModeName> {
        let mut seen = Vec::new();
        for mode in &self.mode_sequence {
            if !seen.contains(mode) {
                seen.push(*mode);
            }
        }
        seen
    }

    /// Records discovered prerequisite floors on the plan and appends
    /// a closing assessment if the sequence lacks one.
    pub fn attach_prerequisites(&mut self, floors: &[Floor]) {
        if let Value::Object(specs) = &mut self.specifications {
            specs.insert(
                "prerequisites".to_string(),
                json!(floors),
            );
            specs.insert("escalation_level".to_string(), json!(1));
        }
        if !self.mode_sequence.contains(&ModeName::Assessment) {
            self.mode_sequence.push(ModeName::Assessment);
        }
    }
}

/// Base mode sequence for a category, before checkpoints.
fn base_sequence(category: GapCategory) -> &'static [ModeName] {
    match category {
        GapCategory::Knowledge => &[ModeName::Reading, ModeName::Watching, ModeName::Assessment],
        GapCategory::Conceptual => &[
            ModeName::QuestioningDebating,
            ModeName::Doing,
            ModeName::Reading,
            ModeName::Assessment,
        ],
        GapCategory::Application => &[
            ModeName::Solving,
            ModeName::Playing,
            ModeName::Doing,
            ModeName::Assessment,
        ],
        GapCategory::Foundational => &[ModeName::Reading, ModeName::Watching, ModeName::Assessment],
        GapCategory::Retention => &[
            ModeName::Reading,
            ModeName::Solving,
            ModeName::Playing,
            ModeName::Assessment,
        ],
        GapCategory::Engagement => &[
            ModeName::Playing,
            ModeName::ListeningSpeaking,
            ModeName::Watching,
            ModeName::Assessment,
        ],
    }
}

/// Interleaves an assessment checkpoint after each content mode except
/// the final entry.
fn add_checkpoints(base: &[ModeName]) -> Vec<ModeName> {
    let mut sequenced = Vec::with_capacity(base.len() * 2);
    for (i, mode) in base.iter().enumerate() {
        sequenced.push(*mode);
        if *mode != ModeName::Assessment && i < base.len() - 1 {
            sequenced.push(ModeName::Assessment);
        }
    }
    sequenced
}

/// Duration heuristic: 15 minutes base, 2 per mode in sequence, 3 per
/// assessment checkpoint.
fn estimate_duration(sequence: &[ModeName]) -> u32 {
    let assessments = sequence
        .iter()
        .filter(|m| **m == ModeName::Assessment)
        .count() as u32;
    15 + sequence.len() as u32 * 2 + assessments * 3
}

/// Producer-facing content requirements per category.
fn content_specifications(gap: &ClassifiedGap) -> Value {
    let category_specs = match gap.category {
        GapCategory::Knowledge => json!({
            "focus": "factual_information_delivery",
            "assessment_focus": "recall",
            "content_requirements": {
                "reading": {"include_glossary": true, "include_memory_aids": true, "highlight_key_terms": true},
                "watching": {"curated_videos": true, "educational_summaries": true},
                "assessment": {"recall_focus": true, "factual_questions": true}
            }
        }),
        GapCategory::Conceptual => json!({
            "focus": "understanding_relationships",
            "assessment_focus": "analysis",
            "content_requirements": {
                "questioning_debating": {"socratic_questions": true, "misconception_correction": true},
                "doing": {"hands_on_experiments": true, "concept_application": true},
                "reading": {"include_visualizations": true, "include_analogies": true},
                "assessment": {"analysis_focus": true, "relationship_questions": true}
            }
        }),
        GapCategory::Application => json!({
            "focus": "practical_problem_solving",
            "assessment_focus": "application",
            "content_requirements": {
                "solving": {"progressive_difficulty": true, "step_by_step_solutions": true},
                "playing": {"problem_based_games": true, "skill_practice": true},
                "doing": {"real_world_applications": true, "practical_exercises": true},
                "assessment": {"application_focus": true, "problem_solving_questions": true}
            }
        }),
        GapCategory::Foundational => json!({
            "focus": "prerequisite_knowledge",
            "assessment_focus": "foundation_check",
            "escalation_required": true,
            "content_requirements": {
                "reading": {"basic_concepts": true, "foundational_notes": true},
                "watching": {"basic_explanations": true, "foundational_videos": true},
                "assessment": {"foundation_check": true, "prerequisite_validation": true}
            }
        }),
        GapCategory::Retention => json!({
            "focus": "spaced_repetition",
            "assessment_focus": "retention_check",
            "content_requirements": {
                "reading": {"include_refreshers": true, "spaced_content": true},
                "solving": {"spaced_repetition": true, "memory_reinforcement": true},
                "playing": {"retention_games": true, "memory_aids": true},
                "assessment": {"retention_check": true, "spaced_assessment": true}
            }
        }),
        GapCategory::Engagement => json!({
            "focus": "motivational_content",
            "assessment_focus": "engagement_check",
            "content_requirements": {
                "playing": {"gamification": true, "interactive_elements": true},
                "listening_speaking": {"storytelling": true, "audio_engagement": true},
                "watching": {"variety_content": true, "visual_engagement": true},
                "assessment": {"engagement_check": true, "motivation_questions": true}
            }
        }),
    };

    let mut specs = json!({
        "gap_code": gap.gap.code,
        "gap_evidence": gap.gap.evidence,
        "gap_category": gap.category.as_str(),
        "targeted_remediation": true,
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut specs, category_specs) {
        base.extend(extra);
    }
    specs
}

/// Builds remediation plans from classified gaps.
#[derive(Debug, Default)]
pub struct StrategyPlanner;

impl StrategyPlanner {
    /// Creates a planner.
    pub fn new() -> Self {
        Self
    }

    /// Produces the plan for one classified gap.
    pub fn plan(&self, gap: &ClassifiedGap) -> RemediationPlan {
        let sequence = add_checkpoints(base_sequence(gap.category));
        let mut specifications = content_specifications(gap);
        if let Value::Object(specs) = &mut specifications {
            specs.insert(
                "mode_sequence".to_string(),
                json!(sequence),
            );
            specs.insert(
                "orchestration_strategy".to_string(),
                json!(format!("{}_remediation_sequence", gap.category)),
            );
        }
        let estimated_duration_minutes = estimate_duration(&sequence);
        RemediationPlan {
            category: gap.category,
            mode_sequence: sequence,
            specifications,
            priority: 1,
            estimated_duration_minutes,
        }
    }
}
