//! Asynchronous task-graph executor.
//!
//! Runs all ready tasks concurrently under a bounded in-flight limit,
//! releases dependents as their dependencies complete, and aggregates
//! per-task outcomes once every task is terminal. Failures never stop
//! independent branches; they cascade only to direct (and transitive)
//! dependents, which are failed without ever invoking their producer.
//! The executor performs no retries: a producer failure is terminal
//! for its task.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::graph::{Task, TaskGraph, TaskStatus};
use crate::modes::ModeName;
use crate::producer::{Artifact, ContextBundle, ProducerError, ProducerRegistry};

/// Events emitted while a graph executes.
///
/// Sent best-effort; a dropped receiver never stalls execution.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// A task acquired a permit and invoked its producer.
    TaskStarted { task_id: Uuid, mode: ModeName },
    /// A task's producer returned an artifact.
    TaskCompleted { task_id: Uuid, mode: ModeName },
    /// A task failed, either from its producer or by cascade.
    TaskFailed {
        task_id: Uuid,
        mode: ModeName,
        error: String,
    },
    /// Terminal-task counters, emitted after every terminal transition.
    Progress { completed: usize, total: usize },
}

/// Outcome of one task's execution.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    /// Id of the task.
    pub task_id: Uuid,
    /// Mode the task was bound to.
    pub mode: ModeName,
    /// Terminal status (`Completed` or `Failed`).
    pub status: TaskStatus,
    /// Artifact on success.
    pub artifact: Option<Artifact>,
    /// Error description on failure.
    pub error: Option<String>,
    /// Producer wall-clock time; zero for cascaded failures.
    pub duration: Duration,
}

impl TaskExecution {
    fn completed(task_id: Uuid, mode: ModeName, artifact: Artifact, duration: Duration) -> Self {
        Self {
            task_id,
            mode,
            status: TaskStatus::Completed,
            artifact: Some(artifact),
            error: None,
            duration,
        }
    }

    fn failed(task_id: Uuid, mode: ModeName, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task_id,
            mode,
            status: TaskStatus::Failed,
            artifact: None,
            error: Some(error.into()),
            duration,
        }
    }

    /// Returns whether the task completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Aggregate result of running one task graph.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Per-task outcomes, keyed by task id.
    pub executions: HashMap<Uuid, TaskExecution>,
    /// Total wall-clock duration of the run.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Number of completed tasks.
    pub fn completed_count(&self) -> usize {
        self.executions.values().filter(|e| e.is_success()).count()
    }

    /// Number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.executions.len() - self.completed_count()
    }

    /// Returns whether every task completed.
    pub fn all_completed(&self) -> bool {
        self.failed_count() == 0
    }

    /// Returns the artifact produced for a mode, if it completed.
    pub fn artifact_for_mode(&self, mode: ModeName) -> Option<&Artifact> {
        self.executions
            .values()
            .find(|e| e.mode == mode)
            .and_then(|e| e.artifact.as_ref())
    }

    /// Failed modes with their error reasons.
    pub fn failures(&self) -> Vec<(ModeName, String)> {
        self.executions
            .values()
            .filter(|e| !e.is_success())
            .map(|e| {
                (
                    e.mode,
                    e.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            })
            .collect()
    }
}

/// Tracks how far a dependent task is from being schedulable.
struct DepTracker {
    remaining: HashSet<Uuid>,
    failed: usize,
}

/// Bounded-concurrency graph executor.
pub struct Executor {
    registry: Arc<ProducerRegistry>,
    max_in_flight: usize,
}

impl Executor {
    /// Creates an executor over a producer registry.
    pub fn new(registry: Arc<ProducerRegistry>, max_in_flight: usize) -> Self {
        Self {
            registry,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Runs the graph to completion and returns per-task outcomes.
    ///
    /// The returned result covers every task in the graph; each is
    /// either `Completed` or `Failed`. Events are emitted on
    /// `event_tx` as tasks start and reach terminal states.
    pub async fn run(
        &self,
        graph: &TaskGraph,
        ctx: &ContextBundle,
        event_tx: mpsc::Sender<ExecutorEvent>,
    ) -> ExecutionResult {
        let start = Instant::now();
        let total = graph.len();
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let (done_tx, mut done_rx) =
            mpsc::channel::<(Uuid, Duration, Result<Artifact, ProducerError>)>(total.max(1));

        let mut trackers: HashMap<Uuid, DepTracker> = graph
            .tasks()
            .iter()
            .map(|(id, task)| {
                (
                    *id,
                    DepTracker {
                        remaining: task.dependencies.iter().copied().collect(),
                        failed: 0,
                    },
                )
            })
            .collect();

        let mut executions: HashMap<Uuid, TaskExecution> = HashMap::new();
        let mut artifacts: HashMap<Uuid, Artifact> = HashMap::new();
        let mut scheduled: HashSet<Uuid> = HashSet::new();

        debug!(
            tasks = total,
            ready = graph.ready_set().len(),
            max_in_flight = self.max_in_flight,
            "Starting graph execution"
        );

        for id in graph.ready_set() {
            let Some(task) = graph.task(id) else { continue };
            scheduled.insert(*id);
            self.spawn_task(task, Vec::new(), ctx, &semaphore, &done_tx, &event_tx);
        }

        while executions.len() < total {
            let Some((task_id, duration, result)) = done_rx.recv().await else {
                warn!("Executor completion channel closed early");
                break;
            };
            let Some(mode) = graph.task(&task_id).map(|t| t.mode) else {
                warn!(%task_id, "Completion for unknown task");
                continue;
            };

            // Terminal notifications to propagate: (task id, completed?).
            let mut notifications: VecDeque<(Uuid, bool)> = VecDeque::new();

            match result {
                Ok(artifact) => {
                    debug!(%task_id, %mode, ?duration, "Task completed");
                    artifacts.insert(task_id, artifact.clone());
                    executions.insert(
                        task_id,
                        TaskExecution::completed(task_id, mode, artifact, duration),
                    );
                    self.send_event(&event_tx, ExecutorEvent::TaskCompleted { task_id, mode })
                        .await;
                    notifications.push_back((task_id, true));
                }
                Err(e) => {
                    warn!(%task_id, %mode, error = %e, "Task failed");
                    executions.insert(
                        task_id,
                        TaskExecution::failed(task_id, mode, e.to_string(), duration),
                    );
                    self.send_event(
                        &event_tx,
                        ExecutorEvent::TaskFailed {
                            task_id,
                            mode,
                            error: e.to_string(),
                        },
                    )
                    .await;
                    notifications.push_back((task_id, false));
                }
            }

            while let Some((terminal_id, ok)) = notifications.pop_front() {
                for dependent_id in graph.dependents_of(&terminal_id) {
                    if executions.contains_key(dependent_id) || scheduled.contains(dependent_id) {
                        continue;
                    }
                    let Some(dependent) = graph.task(dependent_id) else {
                        continue;
                    };
                    let Some(tracker) = trackers.get_mut(dependent_id) else {
                        continue;
                    };
                    tracker.remaining.remove(&terminal_id);
                    if !ok {
                        tracker.failed += 1;
                    }

                    match self.decide(dependent, tracker) {
                        Decision::Wait => {}
                        Decision::Run => {
                            let inputs: Vec<Artifact> = dependent
                                .dependencies
                                .iter()
                                .filter_map(|d| artifacts.get(d).cloned())
                                .collect();
                            scheduled.insert(*dependent_id);
                            self.spawn_task(dependent, inputs, ctx, &semaphore, &done_tx, &event_tx);
                        }
                        Decision::Cascade(reason) => {
                            executions.insert(
                                *dependent_id,
                                TaskExecution::failed(
                                    *dependent_id,
                                    dependent.mode,
                                    reason.clone(),
                                    Duration::ZERO,
                                ),
                            );
                            self.send_event(
                                &event_tx,
                                ExecutorEvent::TaskFailed {
                                    task_id: *dependent_id,
                                    mode: dependent.mode,
                                    error: reason,
                                },
                            )
                            .await;
                            notifications.push_back((*dependent_id, false));
                        }
                    }
                }
            }

            let completed = executions.values().filter(|e| e.is_success()).count();
            self.send_event(&event_tx, ExecutorEvent::Progress { completed, total })
                .await;
        }

        let result = ExecutionResult {
            executions,
            duration: start.elapsed(),
        };
        info!(
            completed = result.completed_count(),
            failed = result.failed_count(),
            duration_ms = result.duration.as_millis() as u64,
            "Graph execution finished"
        );
        result
    }

    /// Scheduling decision for a dependent after one of its
    /// dependencies reached a terminal state.
    fn decide(&self, task: &Task, tracker: &DepTracker) -> Decision {
        if task.best_effort {
            // Best-effort waits for all dependencies to settle, then
            // runs if at least one completed.
            if !tracker.remaining.is_empty() {
                return Decision::Wait;
            }
            if tracker.failed == task.dependencies.len() {
                return Decision::Cascade(format!(
                    "all {} dependencies of best-effort mode '{}' failed",
                    tracker.failed, task.mode
                ));
            }
            return Decision::Run;
        }

        // Strict: any failed dependency fails the dependent immediately.
        if tracker.failed > 0 {
            return Decision::Cascade(format!(
                "dependency failed; mode '{}' not invoked",
                task.mode
            ));
        }
        if tracker.remaining.is_empty() {
            Decision::Run
        } else {
            Decision::Wait
        }
    }

    fn spawn_task(
        &self,
        task: &Task,
        inputs: Vec<Artifact>,
        ctx: &ContextBundle,
        semaphore: &Arc<Semaphore>,
        done_tx: &mpsc::Sender<(Uuid, Duration, Result<Artifact, ProducerError>)>,
        event_tx: &mpsc::Sender<ExecutorEvent>,
    ) {
        let task_id = task.id;
        let mode = task.mode;
        let producer = self.registry.get(mode);
        let bundle = ctx.with_inputs(inputs);
        let semaphore = Arc::clone(semaphore);
        let done_tx = done_tx.clone();
        let event_tx = event_tx.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = done_tx
                        .send((
                            task_id,
                            Duration::ZERO,
                            Err(ProducerError::Unavailable(
                                "executor semaphore closed".to_string(),
                            )),
                        ))
                        .await;
                    return;
                }
            };

            let _ = event_tx
                .send(ExecutorEvent::TaskStarted { task_id, mode })
                .await;

            let start = Instant::now();
            let result = match producer {
                Some(producer) => producer.produce(mode, &bundle).await,
                None => Err(ProducerError::Unavailable(format!(
                    "no producer registered for mode '{}'",
                    mode
                ))),
            };
            let _ = done_tx.send((task_id, start.elapsed(), result)).await;
        });
    }

    /// Sends an event, ignoring send errors — the receiver may have
    /// been dropped.
    async fn send_event(&self, event_tx: &mpsc::Sender<ExecutorEvent>, event: ExecutorEvent) {
        let _ = event_tx.send(event).await;
    }
}

/// What to do with a dependent task after a dependency settled.
enum Decision {
    Wait,
    Run,
    Cascade(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskGraphBuilder;
    use crate::modes::DependencyOverrides;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Producer spy: counts invocations per mode and fails on request.
    struct SpyProducer {
        calls: HashMap<ModeName, AtomicUsize>,
        fail_modes: HashSet<ModeName>,
    }

    impl SpyProducer {
        fn new(fail_modes: impl IntoIterator<Item = ModeName>) -> Self {
            Self {
                calls: ModeName::ALL
                    .iter()
                    .map(|m| (*m, AtomicUsize::new(0)))
                    .collect(),
                fail_modes: fail_modes.into_iter().collect(),
            }
        }

        fn call_count(&self, mode: ModeName) -> usize {
            self.calls[&mode].load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl crate::producer::ModeProducer for SpyProducer {
        async fn produce(
            &self,
            mode: ModeName,
            ctx: &ContextBundle,
        ) -> Result<Artifact, ProducerError> {
            self.calls[&mode].fetch_add(1, Ordering::SeqCst);
            if self.fail_modes.contains(&mode) {
                return Err(ProducerError::Generation(format!("forced failure in {}", mode)));
            }
            Ok(Artifact::new(
                mode,
                serde_json::json!({"inputs": ctx.inputs.len()}),
                ctx,
            ))
        }
    }

    fn registry_with(producer: Arc<SpyProducer>) -> Arc<ProducerRegistry> {
        let mut registry = ProducerRegistry::new();
        registry.register_all(producer);
        Arc::new(registry)
    }

    fn drain_events() -> mpsc::Sender<ExecutorEvent> {
        let (tx, mut rx) = mpsc::channel(256);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        tx
    }

    #[tokio::test]
    async fn test_all_tasks_complete() {
        let spy = Arc::new(SpyProducer::new([]));
        let executor = Executor::new(registry_with(Arc::clone(&spy)), 4);
        let graph = TaskGraphBuilder::new()
            .build(&[ModeName::Reading, ModeName::Solving, ModeName::Assessment])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert!(result.all_completed());
        assert_eq!(result.completed_count(), 3);
        assert_eq!(spy.call_count(ModeName::Assessment), 1);
    }

    #[tokio::test]
    async fn test_dependent_receives_completed_inputs() {
        let spy = Arc::new(SpyProducer::new([]));
        let executor = Executor::new(registry_with(spy), 4);
        let graph = TaskGraphBuilder::new()
            .build(&[ModeName::Reading, ModeName::Writing, ModeName::Assessment])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        let assessment = result
            .artifact_for_mode(ModeName::Assessment)
            .expect("assessment completed");
        assert_eq!(assessment.payload["inputs"], 2);
    }

    #[tokio::test]
    async fn test_cascade_failure_skips_producer() {
        let spy = Arc::new(SpyProducer::new([ModeName::Reading]));
        let executor = Executor::new(registry_with(Arc::clone(&spy)), 4);
        let graph = TaskGraphBuilder::new()
            .build(&[ModeName::Reading, ModeName::Assessment])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert_eq!(result.failed_count(), 2);
        // The dependent's producer must never be invoked.
        assert_eq!(spy.call_count(ModeName::Assessment), 0);

        let failures = result.failures();
        assert!(failures.iter().any(|(m, _)| *m == ModeName::Assessment));
    }

    #[tokio::test]
    async fn test_independent_branch_survives_sibling_failure() {
        let spy = Arc::new(SpyProducer::new([ModeName::Solving]));
        let executor = Executor::new(registry_with(spy), 4);
        let graph = TaskGraphBuilder::new()
            .build(&[ModeName::Reading, ModeName::Solving])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert_eq!(result.completed_count(), 1);
        assert!(result.artifact_for_mode(ModeName::Reading).is_some());
        assert!(result.artifact_for_mode(ModeName::Solving).is_none());
    }

    #[tokio::test]
    async fn test_transitive_cascade() {
        // reading -> solving -> assessment, with reading failing.
        let overrides = DependencyOverrides::new()
            .with_edge(ModeName::Solving, ModeName::Reading)
            .with_edge(ModeName::Assessment, ModeName::Solving);
        let spy = Arc::new(SpyProducer::new([ModeName::Reading]));
        let executor = Executor::new(registry_with(Arc::clone(&spy)), 4);
        let graph = TaskGraphBuilder::new()
            .with_overrides(overrides)
            .build(&[ModeName::Reading, ModeName::Solving, ModeName::Assessment])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert_eq!(result.failed_count(), 3);
        assert_eq!(spy.call_count(ModeName::Solving), 0);
        assert_eq!(spy.call_count(ModeName::Assessment), 0);
    }

    #[tokio::test]
    async fn test_best_effort_runs_with_partial_inputs() {
        let overrides = DependencyOverrides::new().with_best_effort(ModeName::Assessment);
        let spy = Arc::new(SpyProducer::new([ModeName::Solving]));
        let executor = Executor::new(registry_with(Arc::clone(&spy)), 4);
        let graph = TaskGraphBuilder::new()
            .with_overrides(overrides)
            .build(&[ModeName::Reading, ModeName::Solving, ModeName::Assessment])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert_eq!(spy.call_count(ModeName::Assessment), 1);
        let assessment = result
            .artifact_for_mode(ModeName::Assessment)
            .expect("best-effort assessment completed");
        // Only the completed dependency's artifact is attached.
        assert_eq!(assessment.payload["inputs"], 1);
    }

    #[tokio::test]
    async fn test_best_effort_fails_when_all_dependencies_fail() {
        let overrides = DependencyOverrides::new().with_best_effort(ModeName::Assessment);
        let spy = Arc::new(SpyProducer::new([ModeName::Reading, ModeName::Solving]));
        let executor = Executor::new(registry_with(Arc::clone(&spy)), 4);
        let graph = TaskGraphBuilder::new()
            .with_overrides(overrides)
            .build(&[ModeName::Reading, ModeName::Solving, ModeName::Assessment])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert_eq!(spy.call_count(ModeName::Assessment), 0);
        assert_eq!(result.failed_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_producer_fails_task() {
        let mut registry = ProducerRegistry::new();
        registry.register(ModeName::Reading, Arc::new(SpyProducer::new([])));
        let executor = Executor::new(Arc::new(registry), 2);
        let graph = TaskGraphBuilder::new()
            .build(&[ModeName::Reading, ModeName::Watching])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let result = executor.run(&graph, &ctx, drain_events()).await;

        assert_eq!(result.completed_count(), 1);
        let failures = result.failures();
        assert!(failures
            .iter()
            .any(|(m, e)| *m == ModeName::Watching && e.contains("no producer")));
    }

    #[tokio::test]
    async fn test_progress_events_are_emitted() {
        let spy = Arc::new(SpyProducer::new([]));
        let executor = Executor::new(registry_with(spy), 2);
        let graph = TaskGraphBuilder::new()
            .build(&[ModeName::Reading, ModeName::Solving])
            .unwrap();
        let ctx = ContextBundle::new("fractions", "grade-5");

        let (tx, mut rx) = mpsc::channel(64);
        let result = executor.run(&graph, &ctx, tx).await;
        assert!(result.all_completed());

        let mut progress_counts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ExecutorEvent::Progress { completed, .. } = event {
                progress_counts.push(completed);
            }
        }
        assert_eq!(progress_counts.last(), Some(&2));
        // Completed counts only move forward.
        assert!(progress_counts.windows(2).all(|w| w[0] <= w[1]));
    }
}
