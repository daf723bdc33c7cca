//! Learning-gap records and keyword-based classification.
//!
//! A gap arrives as a short code plus free-text evidence. When the
//! reporting side has already categorized it, that category is trusted
//! with high confidence; otherwise the classifier scores each category
//! by keyword hits (code hits weigh double) and picks the best match.

use serde::{Deserialize, Serialize};

/// Classifications below this confidence are logged for review but
/// still remediated.
pub const LOW_CONFIDENCE: f64 = 0.5;

/// Category of a learning gap, driving the remediation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapCategory {
    /// Missing facts, terms, or definitions.
    Knowledge,
    /// Weak grasp of principles and relationships.
    Conceptual,
    /// Cannot apply known material to problems.
    Application,
    /// Missing prerequisite material from earlier grades.
    Foundational,
    /// Previously learned material that faded.
    Retention,
    /// Motivation or attention problems.
    Engagement,
}

impl GapCategory {
    /// All categories, in classification precedence order. Earlier
    /// entries win score ties.
    pub const ALL: [GapCategory; 6] = [
        GapCategory::Knowledge,
        GapCategory::Conceptual,
        GapCategory::Application,
        GapCategory::Foundational,
        GapCategory::Retention,
        GapCategory::Engagement,
    ];

    /// Keywords whose presence in a gap's code or evidence votes for
    /// this category.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            GapCategory::Knowledge => &[
                "basic",
                "fact",
                "term",
                "definition",
                "information",
                "recall",
                "memory",
            ],
            GapCategory::Conceptual => &[
                "concept",
                "principle",
                "theory",
                "understanding",
                "relationship",
                "why",
                "how",
            ],
            GapCategory::Application => &[
                "apply",
                "solve",
                "practice",
                "problem",
                "exercise",
                "implementation",
            ],
            GapCategory::Foundational => &[
                "foundation",
                "prerequisite",
                "basic",
                "elementary",
                "grade",
                "level",
                "fundamental",
            ],
            GapCategory::Retention => &[
                "forgot",
                "remember",
                "recall",
                "retention",
                "spaced",
                "repetition",
            ],
            GapCategory::Engagement => &[
                "motivation",
                "interest",
                "attention",
                "participation",
                "bored",
                "disengaged",
            ],
        }
    }

    /// Canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            GapCategory::Knowledge => "knowledge",
            GapCategory::Conceptual => "conceptual",
            GapCategory::Application => "application",
            GapCategory::Foundational => "foundational",
            GapCategory::Retention => "retention",
            GapCategory::Engagement => "engagement",
        }
    }
}

impl std::fmt::Display for GapCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported learning gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapRecord {
    /// Short identifier, e.g. `"fraction_addition_problem"`.
    pub code: String,
    /// Free-text observations supporting the gap.
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Category assigned upstream, if any.
    #[serde(default)]
    pub category: Option<GapCategory>,
}

impl GapRecord {
    /// Creates an unclassified gap.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            evidence: Vec::new(),
            category: None,
        }
    }

    /// Adds an evidence line.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Sets a pre-assigned category.
    pub fn with_category(mut self, category: GapCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// A gap with its resolved category and classification confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedGap {
    /// The original gap record.
    pub gap: GapRecord,
    /// Resolved category.
    pub category: GapCategory,
    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Short explanation of how the category was chosen.
    pub reasoning: String,
}

impl ClassifiedGap {
    /// Whether the confidence fell below [`LOW_CONFIDENCE`].
    pub fn is_low_confidence(&self) -> bool {
        self.confidence < LOW_CONFIDENCE
    }
}

/// Keyword-vote gap classifier.
#[derive(Debug, Default)]
pub struct GapClassifier;

impl GapClassifier {
    /// Creates a classifier.
    pub fn new() -> Self {
        Self
    }

    /// Resolves a gap's category.
    ///
    /// A pre-assigned category is kept with fixed 0.95 confidence.
    /// Otherwise each category scores 2 per keyword found in the code
    /// and 1 per keyword found in the evidence text; the highest score
    /// wins, earlier categories winning ties. A gap matching nothing
    /// falls back to [`GapCategory::Knowledge`].
    pub fn classify(&self, gap: &GapRecord) -> ClassifiedGap {
        if let Some(category) = gap.category {
            return ClassifiedGap {
                gap: gap.clone(),
                category,
                confidence: 0.95,
                reasoning: format!("pre-assigned category '{}'", category),
            };
        }

        let code = gap.code.to_lowercase();
        let evidence_text = gap.evidence.join(" ").to_lowercase();

        let mut best = GapCategory::Knowledge;
        let mut best_score = 0usize;
        for category in GapCategory::ALL {
            let mut score = 0usize;
            for keyword in category.keywords() {
                if code.contains(keyword) {
                    score += 2;
                }
                if evidence_text.contains(keyword) {
                    score += 1;
                }
            }
            if score > best_score {
                best = category;
                best_score = score;
            }
        }

        let denominator = (best.keywords().len() * 2 + gap.evidence.len()) as f64;
        let confidence = best_score as f64 / denominator;
        ClassifiedGap {
            gap: gap.clone(),
            category: best,
            confidence,
            reasoning: format!(
                "scored {} keyword hits for '{}' in code and evidence",
                best_score, best
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_assigned_category_is_trusted() {
        let gap = GapRecord::new("mystery_gap").with_category(GapCategory::Engagement);
        let classified = GapClassifier::new().classify(&gap);

        assert_eq!(classified.category, GapCategory::Engagement);
        assert!((classified.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_code_keywords_weigh_double() {
        let gap = GapRecord::new("fraction_solve_practice")
            .with_evidence("struggles to apply steps to new problems");
        let classified = GapClassifier::new().classify(&gap);

        assert_eq!(classified.category, GapCategory::Application);
        assert!(classified.confidence > 0.0);
    }

    #[test]
    fn test_retention_classification_from_evidence() {
        let gap = GapRecord::new("decimal_place_value")
            .with_evidence("forgot the procedure after two weeks")
            .with_evidence("needs spaced repetition to retain steps");
        let classified = GapClassifier::new().classify(&gap);

        assert_eq!(classified.category, GapCategory::Retention);
    }

    #[test]
    fn test_unmatched_gap_falls_back_to_knowledge() {
        let gap = GapRecord::new("xyzzy");
        let classified = GapClassifier::new().classify(&gap);

        assert_eq!(classified.category, GapCategory::Knowledge);
        assert!((classified.confidence - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_normalization() {
        // "definition" in code: 2 points out of 7 keywords * 2 + 0 evidence.
        let gap = GapRecord::new("definition_gap");
        let classified = GapClassifier::new().classify(&gap);

        assert_eq!(classified.category, GapCategory::Knowledge);
        assert!((classified.confidence - 2.0 / 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_is_flagged_but_still_classified() {
        let vague = GapClassifier::new().classify(&GapRecord::new("xyzzy"));
        assert!(vague.is_low_confidence());
        assert_eq!(vague.category, GapCategory::Knowledge);

        let assigned = GapClassifier::new()
            .classify(&GapRecord::new("mystery_gap").with_category(GapCategory::Engagement));
        assert!(!assigned.is_low_confidence());
    }

    #[test]
    fn test_every_category_has_keywords() {
        for category in GapCategory::ALL {
            assert!(!category.keywords().is_empty());
        }
    }
}
