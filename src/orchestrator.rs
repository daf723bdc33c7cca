//! Job orchestration: request validation, job creation, and the
//! background run loop tying the graph builder, executor, collector,
//! and persistence together.
//!
//! Submission is synchronous and cheap: requests are validated and the
//! task graph is built before a job is created, so malformed requests
//! are rejected without leaving a failed job behind. Everything after
//! the returned job id happens in a background task that reports
//! through the job store.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::{CompletionPolicy, EngineConfig};
use crate::executor::{Executor, ExecutorEvent};
use crate::graph::{GraphError, TaskGraph, TaskGraphBuilder};
use crate::job::{Job, JobId, JobStore, RouteKind, StoreError};
use crate::modes::{DependencyOverrides, ModeName};
use crate::persistence::{Persistence, PersistenceError};
use crate::producer::{ContextBundle, ProducerRegistry};
use crate::remedy::gap::{GapClassifier, GapRecord};
use crate::remedy::plan::StrategyPlanner;
use crate::remedy::prerequisites::{PrerequisiteLookup, StaticPrerequisiteLookup};
use crate::remedy::spiral::{DescentStrategy, GradeStepDown, SessionRegistry, SessionReport, SpiralController};

/// Broad-route duration bounds, in minutes.
const BROAD_DURATION_RANGE: std::ops::RangeInclusive<u32> = 5..=90;
/// Remedial-route duration bounds, in minutes.
const REMEDIAL_DURATION_RANGE: std::ops::RangeInclusive<u32> = 5..=40;

/// Errors surfaced at submission or lookup time.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request failed validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A requested mode has no registered producer.
    #[error("No producer registered for mode '{0}'")]
    UnknownMode(ModeName),

    /// Graph construction rejected the request.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Job store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored result could not be loaded.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The job has no stored result (not completed, or failed).
    #[error("Job '{0}' has no stored result")]
    ResultNotReady(JobId),
}

/// Topic-driven content generation request.
#[derive(Debug, Clone)]
pub struct BroadRequest {
    /// Topic the content targets.
    pub topic: String,
    /// Grade level of the audience.
    pub grade_level: String,
    /// Optional curriculum goal.
    pub curriculum_goal: Option<String>,
    /// Opaque reference to the originating teaching session.
    pub session_ref: Option<String>,
    /// Requested session length in minutes (5–90).
    pub duration_minutes: u32,
    /// Modes to generate. Duplicates are collapsed.
    pub modes: Vec<ModeName>,
    /// Adjustments to the static dependency table.
    pub overrides: DependencyOverrides,
    /// Per-mode content specifications passed through to producers.
    pub specifications: Value,
    /// Overrides the engine-level completion policy for this job.
    pub completion_policy: Option<CompletionPolicy>,
}

impl BroadRequest {
    /// Creates a request with a 30-minute default duration.
    pub fn new(topic: impl Into<String>, grade_level: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            grade_level: grade_level.into(),
            curriculum_goal: None,
            session_ref: None,
            duration_minutes: 30,
            modes: Vec::new(),
            overrides: DependencyOverrides::default(),
            specifications: Value::Null,
            completion_policy: None,
        }
    }

    /// Sets the requested modes.
    pub fn with_modes(mut self, modes: Vec<ModeName>) -> Self {
        self.modes = modes;
        self
    }

    /// Sets the curriculum goal.
    pub fn with_curriculum_goal(mut self, goal: impl Into<String>) -> Self {
        self.curriculum_goal = Some(goal.into());
        self
    }

    /// Sets the originating session reference.
    pub fn with_session_ref(mut self, session_ref: impl Into<String>) -> Self {
        self.session_ref = Some(session_ref.into());
        self
    }

    /// Sets the session duration in minutes.
    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Sets dependency overrides.
    pub fn with_overrides(mut self, overrides: DependencyOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Sets producer-facing content specifications.
    pub fn with_specifications(mut self, specs: Value) -> Self {
        self.specifications = specs;
        self
    }

    /// Sets a per-job completion policy.
    pub fn with_completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.completion_policy = Some(policy);
        self
    }
}

/// Student-led remediation request.
#[derive(Debug, Clone)]
pub struct RemedialRequest {
    /// Opaque reference to the student.
    pub student_ref: String,
    /// Grade level the student is working at.
    pub grade_level: String,
    /// Requested session length in minutes (5–40).
    pub duration_minutes: u32,
    /// Reported learning gaps, one remediation session each.
    pub gaps: Vec<GapRecord>,
}

impl RemedialRequest {
    /// Creates a request with a 20-minute default duration.
    pub fn new(student_ref: impl Into<String>, grade_level: impl Into<String>) -> Self {
        Self {
            student_ref: student_ref.into(),
            grade_level: grade_level.into(),
            duration_minutes: 20,
            gaps: Vec::new(),
        }
    }

    /// Adds a reported gap.
    pub fn with_gap(mut self, gap: GapRecord) -> Self {
        self.gaps.push(gap);
        self
    }

    /// Sets the session duration in minutes.
    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }
}

/// The orchestration engine.
///
/// Owns the producer registry, job store, and persistence seams; all
/// submission entry points go through it. Cheap to share behind an
/// `Arc`, which submission requires for background task spawning.
pub struct Orchestrator {
    config: EngineConfig,
    registry: Arc<ProducerRegistry>,
    store: Arc<dyn JobStore>,
    persistence: Arc<dyn Persistence>,
    collector: Collector,
    sessions: SessionRegistry,
    prerequisites: Arc<dyn PrerequisiteLookup>,
    descent: Arc<dyn DescentStrategy>,
}

impl Orchestrator {
    /// Creates an orchestrator with default remediation collaborators.
    pub fn new(
        config: EngineConfig,
        registry: Arc<ProducerRegistry>,
        store: Arc<dyn JobStore>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let collector = Collector::new(Arc::clone(&persistence));
        Self {
            config,
            registry,
            store,
            persistence,
            collector,
            sessions: SessionRegistry::new(),
            prerequisites: Arc::new(StaticPrerequisiteLookup::new()),
            descent: Arc::new(GradeStepDown),
        }
    }

    /// Replaces the prerequisite lookup.
    pub fn with_prerequisite_lookup(mut self, lookup: Arc<dyn PrerequisiteLookup>) -> Self {
        self.prerequisites = lookup;
        self
    }

    /// Replaces the descent strategy.
    pub fn with_descent_strategy(mut self, descent: Arc<dyn DescentStrategy>) -> Self {
        self.descent = descent;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prerequisite lookup collaborator.
    pub(crate) fn prerequisite_lookup(&self) -> &Arc<dyn PrerequisiteLookup> {
        &self.prerequisites
    }

    /// Descent strategy collaborator.
    pub(crate) fn descent_strategy(&self) -> &Arc<dyn DescentStrategy> {
        &self.descent
    }

    /// Session registry, shared with the spiral controller.
    pub(crate) fn session_registry(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Job store, shared with the spiral controller.
    pub(crate) fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Collector, shared with the spiral controller.
    pub(crate) fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Submits a broad content-generation job.
    ///
    /// Validates the request, builds the task graph, creates a pending
    /// job, and spawns the run. Returns the job id immediately.
    pub async fn submit_broad(
        self: &Arc<Self>,
        request: BroadRequest,
    ) -> Result<JobId, OrchestratorError> {
        if request.topic.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "topic must not be empty".to_string(),
            ));
        }
        if !BROAD_DURATION_RANGE.contains(&request.duration_minutes) {
            return Err(OrchestratorError::InvalidRequest(format!(
                "duration must be between {} and {} minutes, got {}",
                BROAD_DURATION_RANGE.start(),
                BROAD_DURATION_RANGE.end(),
                request.duration_minutes
            )));
        }
        for mode in &request.modes {
            if !self.registry.supports(*mode) {
                return Err(OrchestratorError::UnknownMode(*mode));
            }
        }

        let graph = TaskGraphBuilder::new()
            .with_overrides(request.overrides.clone())
            .build(&request.modes)?;

        let job = self.store.create(RouteKind::Broad).await;
        info!(
            job_id = %job.id,
            topic = %request.topic,
            modes = request.modes.len(),
            "Broad job accepted"
        );

        let orchestrator = Arc::clone(self);
        let job_id = job.id;
        tokio::spawn(async move {
            orchestrator.run_broad(job_id, graph, request).await;
        });
        Ok(job_id)
    }

    /// Submits a remedial job: one spiral session per reported gap.
    pub async fn submit_remedial(
        self: &Arc<Self>,
        request: RemedialRequest,
    ) -> Result<JobId, OrchestratorError> {
        if request.student_ref.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "student_ref must not be empty".to_string(),
            ));
        }
        if request.gaps.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "at least one gap is required".to_string(),
            ));
        }
        if !REMEDIAL_DURATION_RANGE.contains(&request.duration_minutes) {
            return Err(OrchestratorError::InvalidRequest(format!(
                "duration must be between {} and {} minutes, got {}",
                REMEDIAL_DURATION_RANGE.start(),
                REMEDIAL_DURATION_RANGE.end(),
                request.duration_minutes
            )));
        }

        // Classify and plan up front so unsupported modes are rejected
        // before a job exists.
        let classifier = GapClassifier::new();
        let planner = StrategyPlanner::new();
        let mut sessions = Vec::with_capacity(request.gaps.len());
        for gap in &request.gaps {
            let classified = classifier.classify(gap);
            if classified.is_low_confidence() {
                warn!(
                    gap = %gap.code,
                    category = %classified.category,
                    confidence = classified.confidence,
                    "Low-confidence gap classification; remediating anyway"
                );
            }
            let plan = planner.plan(&classified);
            for mode in plan.unique_modes() {
                if !self.registry.supports(mode) {
                    return Err(OrchestratorError::UnknownMode(mode));
                }
            }
            sessions.push((classified, plan));
        }

        let job = self.store.create(RouteKind::Remedial).await;
        info!(
            job_id = %job.id,
            student = %request.student_ref,
            gaps = sessions.len(),
            "Remedial job accepted"
        );

        let orchestrator = Arc::clone(self);
        let job_id = job.id;
        tokio::spawn(async move {
            let controller = SpiralController::new(orchestrator);
            controller.run(job_id, request, sessions).await;
        });
        Ok(job_id)
    }

    /// Returns a snapshot of a job.
    pub async fn status(&self, id: JobId) -> Result<Job, OrchestratorError> {
        Ok(self.store.get(id).await?)
    }

    /// Loads the stored result of a completed job.
    pub async fn result(
        &self,
        id: JobId,
    ) -> Result<crate::collector::JobResult, OrchestratorError> {
        let job = self.store.get(id).await?;
        let handle = job
            .result
            .ok_or(OrchestratorError::ResultNotReady(id))?;
        Ok(self.persistence.load(&handle).await?)
    }

    /// Polls a job until it reaches a terminal state.
    pub async fn await_terminal(&self, id: JobId) -> Result<Job, OrchestratorError> {
        loop {
            let job = self.status(id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Spiral session reports for a remedial job. Sessions appear as
    /// soon as they register and update after every loop, so polling
    /// mid-run shows the loop counter and child job ids.
    pub async fn sessions_for_job(&self, id: JobId) -> Vec<SessionReport> {
        self.sessions.reports(id).await
    }

    /// Background run of a broad job.
    async fn run_broad(self: Arc<Self>, job_id: JobId, graph: TaskGraph, request: BroadRequest) {
        if let Err(e) = self.store.start(job_id).await {
            error!(%job_id, error = %e, "Failed to start job");
            return;
        }

        let ctx = self.context_for(&request);
        let policy = request
            .completion_policy
            .unwrap_or(self.config.completion_policy);

        let (event_tx, mut event_rx) = mpsc::channel(64);
        let progress_store = Arc::clone(&self.store);
        let listener = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let ExecutorEvent::Progress { completed, total } = event {
                    let pct = ((completed * 100) / total.max(1)) as u8;
                    if progress_store.advance_progress(job_id, pct).await.is_err() {
                        break;
                    }
                }
            }
        });

        let executor = Executor::new(Arc::clone(&self.registry), self.config.max_in_flight);
        let execution = executor.run(&graph, &ctx, event_tx).await;
        let _ = listener.await;

        let result = self.collector.collect(job_id, &execution);
        let acceptable = match policy {
            CompletionPolicy::Strict => result.is_complete(),
            CompletionPolicy::BestEffort => !result.artifacts.is_empty(),
        };

        let transition = if acceptable {
            match self.collector.persist(job_id, &result).await {
                Ok(handle) => self.store.complete(job_id, handle).await,
                Err(e) => {
                    warn!(%job_id, error = %e, "Result persistence failed");
                    self.store
                        .fail(job_id, format!("result persistence failed: {}", e), true)
                        .await
                }
            }
        } else {
            let summary = result
                .failure_summary()
                .unwrap_or_else(|| "no modes produced content".to_string());
            self.store.fail(job_id, summary, false).await
        };

        if let Err(e) = transition {
            error!(%job_id, error = %e, "Failed to record job outcome");
        }
    }

    fn context_for(&self, request: &BroadRequest) -> ContextBundle {
        let mut ctx = ContextBundle::new(&request.topic, &request.grade_level)
            .with_context_refs(serde_json::json!({
                "session_ref": request.session_ref,
                "duration_minutes": request.duration_minutes,
            }))
            .with_specifications(request.specifications.clone());
        if let Some(goal) = &request.curriculum_goal {
            ctx = ctx.with_curriculum_goal(goal.clone());
        }
        ctx
    }
}

/// Clamps a plan's duration estimate into the broad-route bounds.
pub(crate) fn clamp_duration(minutes: u32) -> u32 {
    minutes.clamp(*BROAD_DURATION_RANGE.start(), *BROAD_DURATION_RANGE.end())
}
