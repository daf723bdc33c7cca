//! Gap-driven remediation: classification, strategy planning,
//! prerequisite discovery, and the spiral loop controller.

pub mod gap;
pub mod plan;
pub mod prerequisites;
pub mod spiral;

pub use gap::{ClassifiedGap, GapCategory, GapClassifier, GapRecord, LOW_CONFIDENCE};
pub use plan::{RemediationPlan, StrategyPlanner};
pub use prerequisites::{Floor, LookupError, PrerequisiteLookup, StaticPrerequisiteLookup};
pub use spiral::{
    Descent, DescentStrategy, GradeStepDown, LoopEvaluation, SessionReport, SpiralController,
    SpiralOutcome,
};
