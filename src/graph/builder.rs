//! Pure construction of an immutable task graph from a requested mode set.
//!
//! The builder applies the static dependency table plus any operator
//! overrides, deduplicates the requested modes, and computes a
//! topological ordering. Cycles cannot arise from the static table
//! alone, but user-supplied override edges can introduce them; those
//! are rejected at build time rather than discovered mid-execution.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use uuid::Uuid;

use crate::modes::{DependencyOverrides, ModeName};

use super::task::Task;

/// Errors that can occur during graph construction.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The requested mode set was empty.
    #[error("Requested mode set must not be empty")]
    EmptyModeSet,

    /// The dependency table (after overrides) contains a cycle.
    #[error("Cyclic dependency detected involving mode '{0}'")]
    CyclicDependency(ModeName),
}

/// An immutable directed acyclic task graph for one job.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: HashMap<Uuid, Task>,
    /// Task ids in topological order.
    order: Vec<Uuid>,
    /// Reverse edges: task id to the tasks that depend on it.
    dependents: HashMap<Uuid, Vec<Uuid>>,
    /// Tasks with no dependencies, runnable immediately.
    ready: Vec<Uuid>,
}

impl TaskGraph {
    /// Looks up a task by id.
    pub fn task(&self, id: &Uuid) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Looks up the task for a mode.
    pub fn task_for_mode(&self, mode: ModeName) -> Option<&Task> {
        self.tasks.values().find(|t| t.mode == mode)
    }

    /// All tasks, keyed by id.
    pub fn tasks(&self) -> &HashMap<Uuid, Task> {
        &self.tasks
    }

    /// Task ids in topological order.
    pub fn order(&self) -> &[Uuid] {
        &self.order
    }

    /// The initial ready set: tasks with no dependencies.
    pub fn ready_set(&self) -> &[Uuid] {
        &self.ready
    }

    /// Tasks that depend on the given task.
    pub fn dependents_of(&self, id: &Uuid) -> &[Uuid] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Builds task graphs from requested mode sets.
#[derive(Debug, Clone, Default)]
pub struct TaskGraphBuilder {
    overrides: DependencyOverrides,
}

impl TaskGraphBuilder {
    /// Creates a builder with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operator-supplied dependency overrides.
    pub fn with_overrides(mut self, overrides: DependencyOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Builds an immutable graph for the requested modes.
    ///
    /// Duplicate modes in the request are collapsed into one task each.
    ///
    /// # Errors
    ///
    /// `GraphError::EmptyModeSet` if no modes were requested,
    /// `GraphError::CyclicDependency` if overrides introduce a cycle.
    pub fn build(&self, requested: &[ModeName]) -> Result<TaskGraph, GraphError> {
        if requested.is_empty() {
            return Err(GraphError::EmptyModeSet);
        }

        // Deduplicate while keeping request order.
        let mut seen = HashSet::new();
        let modes: Vec<ModeName> = requested
            .iter()
            .copied()
            .filter(|m| seen.insert(*m))
            .collect();
        let mode_set: HashSet<ModeName> = modes.iter().copied().collect();

        // Effective dependency edges: static table plus overrides, both
        // restricted to modes that are actually requested.
        let mut deps: HashMap<ModeName, HashSet<ModeName>> =
            modes.iter().map(|m| (*m, HashSet::new())).collect();
        for mode in &modes {
            for dep in mode.static_dependencies() {
                if mode_set.contains(dep) {
                    if let Some(d) = deps.get_mut(mode) {
                        d.insert(*dep);
                    }
                }
            }
        }
        for edge in &self.overrides.edges {
            if mode_set.contains(&edge.mode) && mode_set.contains(&edge.depends_on) {
                if let Some(d) = deps.get_mut(&edge.mode) {
                    d.insert(edge.depends_on);
                }
            }
        }

        // Kahn's algorithm over modes.
        let mut in_degree: HashMap<ModeName, usize> =
            modes.iter().map(|m| (*m, deps[m].len())).collect();
        let mut queue: Vec<ModeName> = modes
            .iter()
            .copied()
            .filter(|m| in_degree[m] == 0)
            .collect();
        let mut topo: Vec<ModeName> = Vec::with_capacity(modes.len());

        while let Some(mode) = queue.pop() {
            topo.push(mode);
            for other in &modes {
                if deps[other].contains(&mode) {
                    let degree = in_degree.get_mut(other).expect("all modes tracked");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(*other);
                    }
                }
            }
        }

        if topo.len() != modes.len() {
            let stuck = modes
                .iter()
                .copied()
                .find(|m| in_degree[m] > 0)
                .expect("a cycle leaves at least one mode with unmet dependencies");
            return Err(GraphError::CyclicDependency(stuck));
        }

        // Materialize tasks in topological order so dependency ids exist
        // before their dependents reference them.
        let best_effort: HashSet<ModeName> = self.overrides.best_effort.iter().copied().collect();
        let mut id_for_mode: HashMap<ModeName, Uuid> = HashMap::new();
        let mut tasks: HashMap<Uuid, Task> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::with_capacity(topo.len());
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut ready: Vec<Uuid> = Vec::new();

        for mode in &topo {
            let dep_ids: Vec<Uuid> = deps[mode].iter().map(|d| id_for_mode[d]).collect();
            let task = Task::new(*mode, dep_ids.clone())
                .with_best_effort(best_effort.contains(mode));
            let id = task.id;

            id_for_mode.insert(*mode, id);
            order.push(id);
            if dep_ids.is_empty() {
                ready.push(id);
            }
            for dep in dep_ids {
                dependents.entry(dep).or_default().push(id);
            }
            tasks.insert(id, task);
        }

        Ok(TaskGraph {
            tasks,
            order,
            dependents,
            ready,
        })
    }
}
