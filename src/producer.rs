//! Mode producer seam: the contract between the orchestration core and
//! the external generative capabilities.
//!
//! Each content mode is backed by one [`ModeProducer`]. The core treats
//! producers as black boxes: given a context bundle they eventually
//! resolve with an [`Artifact`] or fail with a [`ProducerError`]. Retry
//! and backoff, if any, live behind this trait; the executor treats a
//! producer failure as terminal for the task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::modes::ModeName;

/// Errors a producer can fail with.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The backing generative service is unreachable.
    #[error("Producer unavailable: {0}")]
    Unavailable(String),

    /// Content generation itself failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The context bundle was missing something this producer needs.
    #[error("Invalid context for {mode}: {reason}")]
    InvalidContext { mode: ModeName, reason: String },

    /// The producer gave up after a deadline.
    #[error("Producer timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

/// The context handed to a producer for one task.
///
/// Dependency artifacts are attached by the executor before invocation;
/// a producer only ever sees completed dependency outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Topic the content targets.
    pub topic: String,
    /// Grade level of the audience.
    pub grade_level: String,
    /// Optional curriculum goal.
    #[serde(default)]
    pub curriculum_goal: Option<String>,
    /// Opaque references into the caller's world (session ids, lesson
    /// scripts, recent performance).
    #[serde(default)]
    pub context_refs: serde_json::Value,
    /// Free-form per-mode content specifications.
    #[serde(default)]
    pub specifications: serde_json::Value,
    /// Completed dependency artifacts, attached by the executor.
    #[serde(default)]
    pub inputs: Vec<Artifact>,
}

impl ContextBundle {
    /// Creates a context bundle for a topic and grade level.
    pub fn new(topic: impl Into<String>, grade_level: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            grade_level: grade_level.into(),
            curriculum_goal: None,
            context_refs: serde_json::Value::Null,
            specifications: serde_json::Value::Null,
            inputs: Vec::new(),
        }
    }

    /// Sets the curriculum goal.
    pub fn with_curriculum_goal(mut self, goal: impl Into<String>) -> Self {
        self.curriculum_goal = Some(goal.into());
        self
    }

    /// Sets the caller context references.
    pub fn with_context_refs(mut self, refs: serde_json::Value) -> Self {
        self.context_refs = refs;
        self
    }

    /// Sets the per-mode content specifications.
    pub fn with_specifications(mut self, specs: serde_json::Value) -> Self {
        self.specifications = specs;
        self
    }

    /// Returns a copy of this bundle with dependency artifacts attached.
    pub fn with_inputs(&self, inputs: Vec<Artifact>) -> Self {
        let mut bundle = self.clone();
        bundle.inputs = inputs;
        bundle
    }
}

/// The immutable output of one producer invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique content identifier.
    pub content_id: Uuid,
    /// Mode that produced this artifact.
    pub mode: ModeName,
    /// Opaque typed payload.
    pub payload: serde_json::Value,
    /// Topic context the artifact was generated for.
    pub topic: String,
    /// Grade level context.
    pub grade_level: String,
    /// When the artifact was created.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a new artifact for a mode within the given context.
    pub fn new(mode: ModeName, payload: serde_json::Value, ctx: &ContextBundle) -> Self {
        Self {
            content_id: Uuid::new_v4(),
            mode,
            payload,
            topic: ctx.topic.clone(),
            grade_level: ctx.grade_level.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Contract implemented by every content-mode producer.
#[async_trait]
pub trait ModeProducer: Send + Sync {
    /// Produces content for `mode` given the context bundle.
    ///
    /// No latency contract is assumed beyond "eventually resolves or
    /// fails".
    async fn produce(&self, mode: ModeName, ctx: &ContextBundle) -> Result<Artifact, ProducerError>;
}

/// Registry mapping each mode to its producer.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: HashMap<ModeName, Arc<dyn ModeProducer>>,
}

impl ProducerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer for a mode, replacing any previous one.
    pub fn register(&mut self, mode: ModeName, producer: Arc<dyn ModeProducer>) {
        self.producers.insert(mode, producer);
    }

    /// Registers one producer for every known mode.
    pub fn register_all(&mut self, producer: Arc<dyn ModeProducer>) {
        for mode in ModeName::ALL {
            self.producers.insert(mode, Arc::clone(&producer));
        }
    }

    /// Looks up the producer for a mode.
    pub fn get(&self, mode: ModeName) -> Option<Arc<dyn ModeProducer>> {
        self.producers.get(&mode).cloned()
    }

    /// Returns whether a producer is registered for the mode.
    pub fn supports(&self, mode: ModeName) -> bool {
        self.producers.contains_key(&mode)
    }

    /// Number of registered producers.
    pub fn len(&self) -> usize {
        self.producers.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

/// A local producer that fabricates plausible artifacts.
///
/// Used by the CLI harness and examples; real deployments register
/// producers that call out to generative services instead.
pub struct StubProducer {
    /// Upper bound on the simulated generation latency.
    latency: Duration,
}

impl StubProducer {
    /// Creates a stub producer with a small default latency.
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(50),
        }
    }

    /// Sets the maximum simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for StubProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModeProducer for StubProducer {
    async fn produce(&self, mode: ModeName, ctx: &ContextBundle) -> Result<Artifact, ProducerError> {
        use rand::Rng;

        let (delay_ms, mastery) = {
            let mut rng = rand::thread_rng();
            let max = self.latency.as_millis().max(1) as u64;
            (rng.gen_range(1..=max), rng.gen_range(0.55..0.95))
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let payload = match mode {
            ModeName::Assessment => serde_json::json!({
                "kind": "assessment",
                "question_count": 5,
                "mastery_score": mastery,
                "sources": ctx.inputs.iter().map(|a| a.content_id).collect::<Vec<_>>(),
            }),
            other => serde_json::json!({
                "kind": other.as_str(),
                "title": format!("{} — {}", ctx.topic, other),
                "body": format!("Generated {} content for grade {}", other, ctx.grade_level),
            }),
        };

        Ok(Artifact::new(mode, payload, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_bundle_builder() {
        let ctx = ContextBundle::new("fractions", "grade-5")
            .with_curriculum_goal("understand equivalent fractions")
            .with_context_refs(serde_json::json!({"session_id": "s-1"}));

        assert_eq!(ctx.topic, "fractions");
        assert_eq!(ctx.grade_level, "grade-5");
        assert_eq!(
            ctx.curriculum_goal.as_deref(),
            Some("understand equivalent fractions")
        );
        assert!(ctx.inputs.is_empty());
    }

    #[test]
    fn test_with_inputs_does_not_mutate_original() {
        let ctx = ContextBundle::new("algebra", "grade-7");
        let artifact = Artifact::new(ModeName::Reading, serde_json::json!({}), &ctx);

        let enriched = ctx.with_inputs(vec![artifact]);
        assert_eq!(enriched.inputs.len(), 1);
        assert!(ctx.inputs.is_empty());
    }

    #[test]
    fn test_artifact_inherits_context() {
        let ctx = ContextBundle::new("photosynthesis", "grade-6");
        let artifact = Artifact::new(ModeName::Watching, serde_json::json!({"url": "x"}), &ctx);

        assert_eq!(artifact.mode, ModeName::Watching);
        assert_eq!(artifact.topic, "photosynthesis");
        assert_eq!(artifact.grade_level, "grade-6");
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = ProducerRegistry::new();
        assert!(registry.is_empty());

        registry.register(ModeName::Reading, Arc::new(StubProducer::new()));
        assert!(registry.supports(ModeName::Reading));
        assert!(!registry.supports(ModeName::Solving));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_register_all() {
        let mut registry = ProducerRegistry::new();
        registry.register_all(Arc::new(StubProducer::new()));
        assert_eq!(registry.len(), ModeName::ALL.len());
        for mode in ModeName::ALL {
            assert!(registry.supports(mode));
        }
    }

    #[tokio::test]
    async fn test_stub_producer_assessment_payload() {
        let producer = StubProducer::new().with_latency(Duration::from_millis(2));
        let ctx = ContextBundle::new("fractions", "grade-5");

        let artifact = producer
            .produce(ModeName::Assessment, &ctx)
            .await
            .expect("stub should succeed");

        let score = artifact.payload["mastery_score"]
            .as_f64()
            .expect("assessment payload carries a mastery score");
        assert!((0.0..=1.0).contains(&score));
    }

    #[tokio::test]
    async fn test_stub_producer_content_payload() {
        let producer = StubProducer::new().with_latency(Duration::from_millis(2));
        let ctx = ContextBundle::new("fractions", "grade-5");

        let artifact = producer
            .produce(ModeName::Reading, &ctx)
            .await
            .expect("stub should succeed");

        assert_eq!(artifact.payload["kind"], "reading");
    }
}
