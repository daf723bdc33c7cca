//! The remediation spiral: repeated plan → generate → assess loops.
//!
//! Each reported gap gets its own session. A session submits a child
//! content job built from the gap's remediation plan, waits for it,
//! and reads the mastery score from the assessment artifact. Mastery
//! at or above the pass threshold resolves the session; otherwise the
//! descent strategy steps the material down a level and the next loop
//! runs, up to the configured loop bound. Exhausting the bound is a
//! reportable outcome, not a job failure: the parent job completes
//! either way and the per-session verdicts stay queryable.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::collector::JobResult;
use crate::config::CompletionPolicy;
use crate::job::{JobId, JobStatus};
use crate::modes::{DependencyOverrides, ModeName};
use crate::orchestrator::{clamp_duration, BroadRequest, Orchestrator, RemedialRequest};
use crate::producer::Artifact;

use super::gap::{ClassifiedGap, GapCategory};
use super::plan::RemediationPlan;
use super::prerequisites::{discover_or_fallback, PrerequisiteLookup};

/// Where a session descends to for its next loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descent {
    /// Topic for the next loop.
    pub topic: String,
    /// Grade level for the next loop.
    pub grade_level: String,
}

/// Chooses the next loop's material after a failed mastery check.
pub trait DescentStrategy: Send + Sync {
    /// Returns the topic and grade level for the loop after
    /// `loop_index` failed.
    fn descend(&self, topic: &str, grade_level: &str, loop_index: u32) -> Descent;
}

/// Default descent: keep the topic, step the grade level down one,
/// never below 1.
///
/// Grade levels with a trailing number (`"grade-5"`, `"5"`) are
/// decremented; anything else is left unchanged, so a second loop
/// still reruns the material at the same level.
pub struct GradeStepDown;

impl DescentStrategy for GradeStepDown {
    fn descend(&self, topic: &str, grade_level: &str, _loop_index: u32) -> Descent {
        Descent {
            topic: topic.to_string(),
            grade_level: step_down(grade_level),
        }
    }
}

fn step_down(grade_level: &str) -> String {
    let digits_start = grade_level
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let (prefix, digits) = grade_level.split_at(digits_start);
    if let Ok(n) = digits.parse::<u32>() {
        if n > 1 {
            return format!("{}{}", prefix, n - 1);
        }
    }
    grade_level.to_string()
}

/// Verdict of one spiral session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SpiralOutcome {
    /// The session is still running; `loops` have finished so far.
    Unresolved { loops: u32 },
    /// Mastery reached the pass threshold.
    Resolved { loops: u32, mastery: f64 },
    /// The loop bound ran out without reaching mastery.
    Exhausted { loops: u32 },
}

impl SpiralOutcome {
    /// Returns whether the session ended in mastery.
    pub fn is_resolved(&self) -> bool {
        matches!(self, SpiralOutcome::Resolved { .. })
    }
}

/// Record of one loop within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvaluation {
    /// 1-based loop number.
    pub loop_index: u32,
    /// Child content job run for this loop, if submission succeeded.
    pub child_job: Option<JobId>,
    /// Topic the loop targeted.
    pub topic: String,
    /// Grade level the loop targeted.
    pub grade_level: String,
    /// Mastery score read from the assessment artifact, if any.
    pub mastery: Option<f64>,
    /// Whether the score met the pass threshold.
    pub passed: bool,
}

/// Full record of one gap's remediation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Gap code the session targeted.
    pub gap_code: String,
    /// Classified category.
    pub category: GapCategory,
    /// Classification confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Current verdict; updated after every loop.
    pub outcome: SpiralOutcome,
    /// Per-loop evaluations, in order.
    pub loops: Vec<LoopEvaluation>,
}

/// Session reports per remedial job.
#[derive(Default)]
pub struct SessionRegistry {
    reports: RwLock<HashMap<JobId, Vec<SessionReport>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current session snapshot of a remedial job,
    /// replacing any earlier one.
    pub async fn record(&self, job_id: JobId, reports: Vec<SessionReport>) {
        self.reports.write().await.insert(job_id, reports);
    }

    /// Returns the recorded sessions for a job, empty if none yet.
    pub async fn reports(&self, job_id: JobId) -> Vec<SessionReport> {
        self.reports
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Runs all spiral sessions of one remedial job.
pub struct SpiralController {
    orchestrator: Arc<Orchestrator>,
}

impl SpiralController {
    /// Creates a controller bound to the orchestrator.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Drives every session to its verdict, then completes the parent
    /// job with the merged artifacts of each session's final loop.
    pub async fn run(
        self,
        parent: JobId,
        request: RemedialRequest,
        sessions: Vec<(ClassifiedGap, RemediationPlan)>,
    ) {
        let orchestrator = &self.orchestrator;
        if let Err(e) = orchestrator.store().start(parent).await {
            error!(%parent, error = %e, "Failed to start remedial job");
            return;
        }

        let max_loops = orchestrator.config().max_loops;
        let threshold = orchestrator.config().pass_threshold;
        let total_loops = (sessions.len() as u32 * max_loops).max(1);

        let mut reports = Vec::with_capacity(sessions.len());
        let mut merged_artifacts: HashMap<ModeName, Artifact> = HashMap::new();

        for (session_idx, (classified, mut plan)) in sessions.into_iter().enumerate() {
            if classified.category == GapCategory::Foundational {
                let floors = discover_or_fallback(
                    orchestrator.prerequisite_lookup().as_ref(),
                    &classified.gap.code,
                    &request.grade_level,
                )
                .await;
                plan.attach_prerequisites(&floors);
            }

            let mut topic = classified.gap.code.clone();
            let mut grade_level = request.grade_level.clone();
            let mut report = SessionReport {
                gap_code: classified.gap.code.clone(),
                category: classified.category,
                confidence: classified.confidence,
                outcome: SpiralOutcome::Unresolved { loops: 0 },
                loops: Vec::new(),
            };
            // Visible to pollers before the first loop starts.
            self.publish(parent, &reports, &report).await;

            for loop_index in 1..=max_loops {
                info!(
                    %parent,
                    gap = %classified.gap.code,
                    loop_index,
                    topic = %topic,
                    grade = %grade_level,
                    "Starting remediation loop"
                );

                let child = BroadRequest::new(&topic, &grade_level)
                    .with_modes(plan.unique_modes())
                    .with_duration_minutes(clamp_duration(plan.estimated_duration_minutes))
                    .with_specifications(plan.specifications.clone())
                    .with_overrides(
                        DependencyOverrides::new().with_best_effort(ModeName::Assessment),
                    )
                    .with_completion_policy(CompletionPolicy::BestEffort)
                    .with_session_ref(format!("remedy/{}/{}", parent, loop_index));

                let (child_job, mastery) = self.run_loop(child, &mut merged_artifacts).await;
                let passed = mastery.map(|m| m >= threshold).unwrap_or(false);
                report.loops.push(LoopEvaluation {
                    loop_index,
                    child_job,
                    topic: topic.clone(),
                    grade_level: grade_level.clone(),
                    mastery,
                    passed,
                });
                report.outcome = if passed {
                    SpiralOutcome::Resolved {
                        loops: loop_index,
                        mastery: mastery.unwrap_or(threshold),
                    }
                } else if loop_index == max_loops {
                    SpiralOutcome::Exhausted { loops: max_loops }
                } else {
                    SpiralOutcome::Unresolved { loops: loop_index }
                };
                self.publish(parent, &reports, &report).await;

                let loops_done = session_idx as u32 * max_loops + loop_index;
                let pct = ((loops_done * 100) / total_loops).min(99) as u8;
                let _ = orchestrator.store().advance_progress(parent, pct).await;

                if passed {
                    break;
                }

                if loop_index < max_loops {
                    let descent = self
                        .next_floor(&classified.gap.code, &topic, &grade_level, loop_index)
                        .await;
                    topic = descent.topic;
                    grade_level = descent.grade_level;
                }
            }

            info!(
                %parent,
                gap = %classified.gap.code,
                resolved = report.outcome.is_resolved(),
                loops = report.loops.len(),
                "Remediation session finished"
            );
            reports.push(report);

            // A resolved session skips its remaining loop budget.
            let pct = (((session_idx as u32 + 1) * max_loops * 100) / total_loops).min(99) as u8;
            let _ = orchestrator.store().advance_progress(parent, pct).await;
        }

        orchestrator
            .session_registry()
            .record(parent, reports)
            .await;

        let mut result = JobResult::new(parent);
        result.artifacts = merged_artifacts;
        let transition = match orchestrator.collector().persist(parent, &result).await {
            Ok(handle) => orchestrator.store().complete(parent, handle).await,
            Err(e) => {
                warn!(%parent, error = %e, "Remedial result persistence failed");
                orchestrator
                    .store()
                    .fail(parent, format!("result persistence failed: {}", e), true)
                    .await
            }
        };
        if let Err(e) = transition {
            error!(%parent, error = %e, "Failed to record remedial job outcome");
        }
    }

    /// Publishes the in-progress session so pollers see loop counters
    /// and child job ids while the spiral is still running.
    async fn publish(&self, parent: JobId, finished: &[SessionReport], current: &SessionReport) {
        let mut snapshot = finished.to_vec();
        snapshot.push(current.clone());
        self.orchestrator
            .session_registry()
            .record(parent, snapshot)
            .await;
    }

    /// Selects the next loop's floor through the prerequisite lookup,
    /// taking the highest-priority candidate. Falls back to the
    /// descent strategy when the lookup fails or returns no
    /// candidates. A floor's `"previous"` grade sentinel resolves
    /// against the current level.
    async fn next_floor(
        &self,
        gap_code: &str,
        topic: &str,
        grade_level: &str,
        loop_index: u32,
    ) -> Descent {
        let orchestrator = &self.orchestrator;
        let floors = match orchestrator
            .prerequisite_lookup()
            .discover(gap_code, grade_level)
            .await
        {
            Ok(floors) => floors,
            Err(e) => {
                warn!(gap_code, error = %e, "Prerequisite lookup failed; descending heuristically");
                Vec::new()
            }
        };
        match floors.into_iter().min_by_key(|f| f.priority) {
            Some(floor) => {
                let next_grade = if floor.grade_level == "previous" {
                    orchestrator
                        .descent_strategy()
                        .descend(topic, grade_level, loop_index)
                        .grade_level
                } else {
                    floor.grade_level
                };
                Descent {
                    topic: floor.topic,
                    grade_level: next_grade,
                }
            }
            None => orchestrator
                .descent_strategy()
                .descend(topic, grade_level, loop_index),
        }
    }

    /// Runs one child content job and extracts the mastery signal.
    ///
    /// Artifacts from the child (including from earlier loops) are
    /// merged so the parent result reflects the latest material.
    async fn run_loop(
        &self,
        child: BroadRequest,
        merged_artifacts: &mut HashMap<ModeName, Artifact>,
    ) -> (Option<JobId>, Option<f64>) {
        let child_id = match self.orchestrator.submit_broad(child).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Child job submission failed");
                return (None, None);
            }
        };

        let child_job = match self.orchestrator.await_terminal(child_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(%child_id, error = %e, "Child job lookup failed");
                return (Some(child_id), None);
            }
        };
        if child_job.status != JobStatus::Completed {
            return (Some(child_id), None);
        }

        let result = match self.orchestrator.result(child_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(%child_id, error = %e, "Child result load failed");
                return (Some(child_id), None);
            }
        };

        let mastery = result
            .artifacts
            .get(&ModeName::Assessment)
            .and_then(|a| a.payload.get("mastery_score"))
            .and_then(|v| v.as_f64());
        for (mode, artifact) in result.artifacts {
            merged_artifacts.insert(mode, artifact);
        }
        (Some(child_id), mastery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::job::InMemoryJobStore;
    use crate::persistence::InMemoryPersistence;
    use crate::producer::{ContextBundle, ModeProducer, ProducerError, ProducerRegistry};
    use crate::remedy::gap::GapRecord;
    use crate::remedy::prerequisites::{Floor, LookupError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    /// Content producer whose assessment scores follow a fixed script,
    /// one entry per assessment invocation.
    struct ScriptedProducer {
        scores: Vec<f64>,
        assessment_calls: AtomicUsize,
    }

    impl ScriptedProducer {
        fn new(scores: Vec<f64>) -> Self {
            Self {
                scores,
                assessment_calls: AtomicUsize::new(0),
            }
        }

        fn assessments_run(&self) -> usize {
            self.assessment_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModeProducer for ScriptedProducer {
        async fn produce(
            &self,
            mode: ModeName,
            ctx: &ContextBundle,
        ) -> Result<Artifact, ProducerError> {
            let payload = if mode == ModeName::Assessment {
                let call = self.assessment_calls.fetch_add(1, Ordering::SeqCst);
                let score = self.scores[call.min(self.scores.len() - 1)];
                serde_json::json!({"mastery_score": score})
            } else {
                serde_json::json!({"kind": mode.as_str()})
            };
            Ok(Artifact::new(mode, payload, ctx))
        }
    }

    fn engine_with(producer: Arc<ScriptedProducer>) -> Arc<Orchestrator> {
        let mut registry = ProducerRegistry::new();
        registry.register_all(producer);
        Arc::new(Orchestrator::new(
            EngineConfig::default().with_poll_interval(Duration::from_millis(5)),
            Arc::new(registry),
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryPersistence::new()),
        ))
    }

    #[test]
    fn test_grade_step_down() {
        let strategy = GradeStepDown;
        assert_eq!(
            strategy.descend("fractions", "grade-5", 1).grade_level,
            "grade-4"
        );
        assert_eq!(strategy.descend("fractions", "7", 1).grade_level, "6");
        // Floor at 1.
        assert_eq!(
            strategy.descend("fractions", "grade-1", 1).grade_level,
            "grade-1"
        );
        // Non-numeric grades stay put.
        assert_eq!(
            strategy.descend("fractions", "kindergarten", 1).grade_level,
            "kindergarten"
        );
        assert_eq!(strategy.descend("fractions", "grade-5", 1).topic, "fractions");
    }

    #[tokio::test]
    async fn test_session_registry_round_trip() {
        let registry = SessionRegistry::new();
        let job_id = Uuid::new_v4();
        assert!(registry.reports(job_id).await.is_empty());

        registry
            .record(
                job_id,
                vec![SessionReport {
                    gap_code: "gap_x".to_string(),
                    category: GapCategory::Knowledge,
                    confidence: 0.62,
                    outcome: SpiralOutcome::Resolved {
                        loops: 1,
                        mastery: 0.9,
                    },
                    loops: Vec::new(),
                }],
            )
            .await;

        let reports = registry.reports(job_id).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].outcome.is_resolved());
    }

    #[tokio::test]
    async fn test_spiral_resolves_on_second_loop() {
        let producer = Arc::new(ScriptedProducer::new(vec![0.4, 0.9]));
        let orchestrator = engine_with(Arc::clone(&producer));

        let parent = orchestrator
            .submit_remedial(
                RemedialRequest::new("student-1", "grade-5")
                    .with_gap(GapRecord::new("fraction_solve_problem")),
            )
            .await
            .unwrap();

        let job = orchestrator.await_terminal(parent).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);

        let reports = orchestrator.sessions_for_job(parent).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].outcome,
            SpiralOutcome::Resolved {
                loops: 2,
                mastery: 0.9
            }
        );
        assert_eq!(reports[0].loops.len(), 2);
        assert!(reports[0].confidence > 0.0);
        assert_eq!(producer.assessments_run(), 2);

        // Second loop descended one grade.
        assert_eq!(reports[0].loops[0].grade_level, "grade-5");
        assert_eq!(reports[0].loops[1].grade_level, "grade-4");
    }

    #[tokio::test]
    async fn test_spiral_exhausts_after_loop_bound() {
        let producer = Arc::new(ScriptedProducer::new(vec![0.3]));
        let orchestrator = engine_with(Arc::clone(&producer));

        let parent = orchestrator
            .submit_remedial(
                RemedialRequest::new("student-1", "grade-5")
                    .with_gap(GapRecord::new("fraction_solve_problem")),
            )
            .await
            .unwrap();

        let job = orchestrator.await_terminal(parent).await.unwrap();
        // Exhaustion is a verdict, not a job failure.
        assert_eq!(job.status, JobStatus::Completed);

        let reports = orchestrator.sessions_for_job(parent).await;
        assert_eq!(reports[0].outcome, SpiralOutcome::Exhausted { loops: 3 });
        assert_eq!(reports[0].loops.len(), 3);
        assert_eq!(producer.assessments_run(), 3);

        // Every loop ran a distinct child job.
        let mut child_ids: Vec<_> = reports[0]
            .loops
            .iter()
            .filter_map(|l| l.child_job)
            .collect();
        child_ids.dedup();
        assert_eq!(child_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_multiple_gaps_run_their_own_sessions() {
        let producer = Arc::new(ScriptedProducer::new(vec![0.95]));
        let orchestrator = engine_with(producer);

        let parent = orchestrator
            .submit_remedial(
                RemedialRequest::new("student-1", "grade-6")
                    .with_gap(GapRecord::new("definition_recall"))
                    .with_gap(GapRecord::new("fraction_solve_problem")),
            )
            .await
            .unwrap();

        let job = orchestrator.await_terminal(parent).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let reports = orchestrator.sessions_for_job(parent).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.outcome.is_resolved()));
        assert_eq!(reports[0].category, GapCategory::Knowledge);
        assert_eq!(reports[1].category, GapCategory::Application);
    }

    #[tokio::test]
    async fn test_foundational_gap_gets_prerequisites() {
        let producer = Arc::new(ScriptedProducer::new(vec![0.9]));
        let orchestrator = engine_with(producer);

        let parent = orchestrator
            .submit_remedial(
                RemedialRequest::new("student-1", "grade-4")
                    .with_gap(GapRecord::new("fundamental_grade_level_gap")),
            )
            .await
            .unwrap();

        orchestrator.await_terminal(parent).await.unwrap();
        let reports = orchestrator.sessions_for_job(parent).await;
        assert_eq!(reports[0].category, GapCategory::Foundational);
        assert!(reports[0].outcome.is_resolved());
    }

    #[tokio::test]
    async fn test_descent_selects_highest_priority_prerequisite_floor() {
        struct CountingLookup {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl PrerequisiteLookup for CountingLookup {
            async fn discover(
                &self,
                _gap_code: &str,
                _grade_level: &str,
            ) -> Result<Vec<Floor>, LookupError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![
                    Floor {
                        topic: "number_sense".to_string(),
                        grade_level: "grade-3".to_string(),
                        priority: 2,
                        description: "Place value and magnitude".to_string(),
                    },
                    Floor {
                        topic: "counting_basics".to_string(),
                        grade_level: "grade-2".to_string(),
                        priority: 1,
                        description: "Counting and grouping".to_string(),
                    },
                ])
            }
        }

        let producer = Arc::new(ScriptedProducer::new(vec![0.3]));
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
        });
        let mut registry = ProducerRegistry::new();
        registry.register_all(Arc::clone(&producer) as Arc<dyn ModeProducer>);
        let orchestrator = Arc::new(
            Orchestrator::new(
                EngineConfig::default().with_poll_interval(Duration::from_millis(5)),
                Arc::new(registry),
                Arc::new(InMemoryJobStore::new()),
                Arc::new(InMemoryPersistence::new()),
            )
            .with_prerequisite_lookup(Arc::clone(&lookup) as Arc<dyn PrerequisiteLookup>),
        );

        let parent = orchestrator
            .submit_remedial(
                RemedialRequest::new("student-1", "grade-5")
                    .with_gap(GapRecord::new("fraction_solve_problem")),
            )
            .await
            .unwrap();
        orchestrator.await_terminal(parent).await.unwrap();

        // Three loops mean two descents, each through the lookup.
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);

        let reports = orchestrator.sessions_for_job(parent).await;
        assert_eq!(reports[0].outcome, SpiralOutcome::Exhausted { loops: 3 });
        assert_eq!(reports[0].loops[0].grade_level, "grade-5");
        assert_eq!(reports[0].loops[1].topic, "counting_basics");
        assert_eq!(reports[0].loops[1].grade_level, "grade-2");
        assert_eq!(reports[0].loops[2].topic, "counting_basics");
    }

    /// Producer whose assessments wait on a semaphore, so a test can
    /// hold a spiral open between loops.
    struct GatedProducer {
        scores: Vec<f64>,
        assessment_calls: AtomicUsize,
        gate: Semaphore,
    }

    #[async_trait]
    impl ModeProducer for GatedProducer {
        async fn produce(
            &self,
            mode: ModeName,
            ctx: &ContextBundle,
        ) -> Result<Artifact, ProducerError> {
            let payload = if mode == ModeName::Assessment {
                let permit = self.gate.acquire().await.expect("gate closed");
                permit.forget();
                let call = self.assessment_calls.fetch_add(1, Ordering::SeqCst);
                let score = self.scores[call.min(self.scores.len() - 1)];
                serde_json::json!({"mastery_score": score})
            } else {
                serde_json::json!({"kind": mode.as_str()})
            };
            Ok(Artifact::new(mode, payload, ctx))
        }
    }

    #[tokio::test]
    async fn test_sessions_are_observable_mid_run() {
        // One permit: the first assessment runs, the second blocks
        // until the test releases it.
        let producer = Arc::new(GatedProducer {
            scores: vec![0.3, 0.9],
            assessment_calls: AtomicUsize::new(0),
            gate: Semaphore::new(1),
        });
        let mut registry = ProducerRegistry::new();
        registry.register_all(Arc::clone(&producer) as Arc<dyn ModeProducer>);
        let orchestrator = Arc::new(Orchestrator::new(
            EngineConfig::default().with_poll_interval(Duration::from_millis(5)),
            Arc::new(registry),
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryPersistence::new()),
        ));

        let parent = orchestrator
            .submit_remedial(
                RemedialRequest::new("student-1", "grade-5")
                    .with_gap(GapRecord::new("fraction_solve_problem")),
            )
            .await
            .unwrap();

        let mid = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let reports = orchestrator.sessions_for_job(parent).await;
                if let Some(report) = reports.first() {
                    if !report.loops.is_empty() {
                        return report.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("session never became observable");

        assert_eq!(mid.outcome, SpiralOutcome::Unresolved { loops: 1 });
        assert!(mid.loops[0].child_job.is_some());
        assert!(!mid.loops[0].passed);

        producer.gate.add_permits(1);
        let job = orchestrator.await_terminal(parent).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let reports = orchestrator.sessions_for_job(parent).await;
        assert_eq!(
            reports[0].outcome,
            SpiralOutcome::Resolved {
                loops: 2,
                mastery: 0.9
            }
        );
    }
}
