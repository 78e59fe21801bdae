//! The task graph: concrete `(package, task)` nodes, dependency edges from
//! package dependencies and `runsAfter` rules, and a deterministic
//! topological order. Sealed before execution; nodes are immutable
//! afterwards and all per-run state lives in the scheduler's tracker.

mod builder;

use std::collections::HashMap;

use lazyrepo_graph_utils as graph;
use lazyrepo_paths::AnchoredSystemPathBuf;
use lazyrepo_task_id::TaskKey;
use petgraph::graph::{Graph, NodeIndex};

pub use builder::{Error as BuilderError, EngineBuilder, RunRequest};

use crate::task_config::TaskConfig;

/// One node of the task graph. Created during graph construction, read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub key: TaskKey,
    pub task_name: String,
    /// Name of the owning package; the root package for top-level tasks.
    pub package_name: String,
    /// Package directory anchored to the workspace root; empty for the
    /// workspace root.
    pub package_dir: AnchoredSystemPathBuf,
    pub config: TaskConfig,
    /// The resolved shell command (explicit `baseCommand` or the package's
    /// script entry).
    pub command: String,
    pub force: bool,
    pub extra_args: Vec<String>,
    /// `runsAfter` references that resolved to scheduled tasks, sorted by
    /// key.
    pub runs_after_keys: Vec<ResolvedRunsAfter>,
    /// Same-task nodes of this package's local dependencies, sorted by key.
    pub dep_task_keys: Vec<TaskKey>,
}

/// A `runsAfter` reference resolved against the scheduled graph.
#[derive(Debug, Clone)]
pub struct ResolvedRunsAfter {
    pub key: TaskKey,
    pub inherits_input: bool,
    pub uses_output: bool,
}

#[derive(Debug, Default)]
pub struct Building;
#[derive(Debug)]
pub struct Built;

#[derive(Debug)]
pub struct Engine<S = Built> {
    marker: std::marker::PhantomData<S>,
    task_graph: Graph<TaskKey, ()>,
    lookup: HashMap<TaskKey, NodeIndex>,
    tasks: HashMap<TaskKey, ScheduledTask>,
    sorted_task_keys: Vec<TaskKey>,
}

impl Engine<Building> {
    pub fn new() -> Self {
        Engine {
            marker: std::marker::PhantomData,
            task_graph: Graph::default(),
            lookup: HashMap::default(),
            tasks: HashMap::default(),
            sorted_task_keys: Vec::new(),
        }
    }

    /// Adds a node, or merges the request flags when the key already exists
    /// (the same task requested twice stays one node, forced if either
    /// request forced it).
    pub fn add_task(&mut self, task: ScheduledTask) {
        if let Some(existing) = self.tasks.get_mut(&task.key) {
            existing.force |= task.force;
            return;
        }
        let index = self.task_graph.add_node(task.key.clone());
        self.lookup.insert(task.key.clone(), index);
        self.tasks.insert(task.key.clone(), task);
    }

    pub fn has_task(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    /// Edge meaning: `upstream` must finish before `downstream` starts.
    pub fn connect(&mut self, upstream: &TaskKey, downstream: &TaskKey) {
        let from = self.lookup[upstream];
        let to = self.lookup[downstream];
        if !self.task_graph.contains_edge(from, to) {
            self.task_graph.add_edge(from, to, ());
        }
    }

    /// Validates acyclicity and fixes the deterministic topological order.
    pub fn seal(self) -> Result<Engine<Built>, graph::Error> {
        let Engine {
            task_graph,
            lookup,
            tasks,
            ..
        } = self;
        graph::validate_graph(&task_graph)?;
        let sorted_task_keys = graph::topo_sort(&task_graph)?
            .into_iter()
            .map(|index| task_graph[index].clone())
            .collect();
        Ok(Engine {
            marker: std::marker::PhantomData,
            task_graph,
            lookup,
            tasks,
            sorted_task_keys,
        })
    }
}

impl Default for Engine<Building> {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine<Built> {
    pub fn task(&self, key: &TaskKey) -> Option<&ScheduledTask> {
        self.tasks.get(key)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task keys in dependency-respecting order, ties broken by ascending
    /// key. Stable across rebuilds of the same workspace state.
    pub fn sorted_task_keys(&self) -> &[TaskKey] {
        &self.sorted_task_keys
    }

    pub fn task_graph(&self) -> &Graph<TaskKey, ()> {
        &self.task_graph
    }

    pub fn node_index(&self, key: &TaskKey) -> NodeIndex {
        self.lookup[key]
    }

    pub fn node_key(&self, index: NodeIndex) -> &TaskKey {
        &self.task_graph[index]
    }

    /// Upstream task keys of `key`, unordered.
    pub fn dependencies(&self, key: &TaskKey) -> Vec<&TaskKey> {
        self.task_graph
            .neighbors_directed(self.lookup[key], petgraph::Direction::Incoming)
            .map(|index| &self.task_graph[index])
            .collect()
    }
}
