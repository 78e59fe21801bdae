//! The scheduler/runner: walks the sealed task graph in dependency order,
//! builds each task's input manifest, decides cache hit vs. miss, and runs
//! commands on miss.
//!
//! Decision logic (ready-set maintenance, status bookkeeping, failure
//! propagation) happens on the scheduler loop; only the per-task visitor
//! work (manifest building, hashing, the child process) runs on worker
//! futures, bounded by a semaphore. Two schedules of the same workspace
//! state produce byte-identical manifests because manifest contents never
//! depend on scheduling order.

mod inputs;
mod summary;
mod tracker;

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
    sync::Arc,
    time::UNIX_EPOCH,
};

use lazyrepo_graph_utils::transitive_dependents;
use lazyrepo_manifest::{InputKind, ManifestBuilder, ManifestOutcome, TaskStatePaths};
use lazyrepo_paths::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};
use lazyrepo_process::{ChildExit, Command, ProcessManager};
use lazyrepo_task_id::TaskKey;
use petgraph::{graph::NodeIndex, Direction};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error};

pub use summary::{RunSummary, TaskStatus};
use tracker::RunTracker;

use crate::{
    engine::{Engine, ScheduledTask},
    env::EnvironmentMap,
    run::inputs::enumerate_inputs,
    task_config::{BaseCacheConfig, CacheConfig, RunType},
    ui::{self, PrefixedWriter},
};

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// An invariant violation: topological order guarantees every upstream
    /// has published its cache key before a dependent builds its manifest.
    #[error("missing cache key for upstream task {upstream} required by {dependent}")]
    MissingUpstreamKey { upstream: String, dependent: String },
    #[error("scheduler worker crashed")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Manifest(#[from] lazyrepo_manifest::Error),
    #[error(transparent)]
    Walk(#[from] lazyrepo_globwalk::WalkError),
    #[error(transparent)]
    Path(#[from] lazyrepo_paths::PathError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct RunOpts {
    /// Upper bound on concurrently running task visitors.
    pub concurrency: usize,
}

impl Default for RunOpts {
    fn default() -> Self {
        RunOpts {
            concurrency: num_cpus::get().max(1),
        }
    }
}

/// How one task's visit ended.
enum TaskExecution {
    Hit,
    Ran,
    Failed(ChildExit),
}

pub struct Run {
    visitor: Arc<Visitor>,
    engine: Arc<Engine>,
    opts: RunOpts,
}

impl Run {
    pub fn new(
        root: AbsoluteSystemPathBuf,
        engine: Engine,
        base_cache: BaseCacheConfig,
        env: EnvironmentMap,
        manager: ProcessManager,
        opts: RunOpts,
    ) -> Self {
        let engine = Arc::new(engine);
        let visitor = Arc::new(Visitor {
            root,
            base_cache,
            env,
            tracker: RunTracker::new(),
            manager,
        });
        Run {
            visitor,
            engine,
            opts,
        }
    }

    pub async fn execute(&self) -> Result<RunSummary, Error> {
        let graph = self.engine.task_graph();
        let mut in_degree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|index| {
                (
                    index,
                    graph.neighbors_directed(index, Direction::Incoming).count(),
                )
            })
            .collect();
        let mut statuses: HashMap<TaskKey, TaskStatus> = self
            .engine
            .tasks()
            .map(|task| (task.key.clone(), TaskStatus::Pending))
            .collect();
        let mut ready: BinaryHeap<Reverse<(TaskKey, NodeIndex)>> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&index, _)| Reverse((graph[index].clone(), index)))
            .collect();
        let mut skipped: HashSet<NodeIndex> = HashSet::new();
        let mut workers: JoinSet<(NodeIndex, Result<TaskExecution, Error>)> = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency));
        let mut serial_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>> = HashMap::new();

        loop {
            while let Some(Reverse((key, index))) = ready.pop() {
                if skipped.contains(&index) {
                    debug!("skipping {key}: upstream failed");
                    statuses.insert(key, TaskStatus::Skipped);
                    release_dependents(graph, index, &mut in_degree, &mut ready);
                    continue;
                }
                let task = self
                    .engine
                    .task(&key)
                    .cloned()
                    .expect("graph nodes have scheduled tasks");
                statuses.insert(key, TaskStatus::Running);

                // tasks marked parallel: false serialize on their task name
                let serial_lock = (!task.config.parallel).then(|| {
                    serial_locks
                        .entry(task.task_name.clone())
                        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                        .clone()
                });
                let semaphore = semaphore.clone();
                let visitor = self.visitor.clone();
                workers.spawn(async move {
                    let _serial = match serial_lock {
                        Some(lock) => Some(lock.lock_owned().await),
                        None => None,
                    };
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("scheduler semaphore stays open");
                    let result = visitor.visit(task).await;
                    (index, result)
                });
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            let (index, result) = joined?;
            let key = self.engine.node_key(index).clone();
            match result {
                Ok(TaskExecution::Hit) => {
                    statuses.insert(key, TaskStatus::SuccessLazy);
                }
                Ok(TaskExecution::Ran) => {
                    statuses.insert(key, TaskStatus::SuccessEager);
                }
                Ok(TaskExecution::Failed(exit)) => {
                    let code = match exit {
                        ChildExit::Finished(code) => Some(code),
                        _ => None,
                    };
                    statuses.insert(key, TaskStatus::Failure(code));
                    skipped.extend(transitive_dependents(graph, index));
                }
                Err(err @ Error::MissingUpstreamKey { .. }) => {
                    // programming error in graph construction; never masked
                    self.visitor.manager.close();
                    return Err(err);
                }
                Err(err) => {
                    error!("{key} failed: {err}");
                    statuses.insert(key, TaskStatus::Failure(None));
                    skipped.extend(transitive_dependents(graph, index));
                }
            }
            release_dependents(graph, index, &mut in_degree, &mut ready);
        }

        Ok(RunSummary::new(statuses))
    }

    /// Kills running children and refuses further spawns. Used on
    /// terminating signals.
    pub fn close(&self) {
        self.visitor.manager.close();
    }
}

fn release_dependents(
    graph: &petgraph::graph::Graph<TaskKey, ()>,
    index: NodeIndex,
    in_degree: &mut HashMap<NodeIndex, usize>,
    ready: &mut BinaryHeap<Reverse<(TaskKey, NodeIndex)>>,
) {
    for downstream in graph.neighbors_directed(index, Direction::Outgoing) {
        let degree = in_degree
            .get_mut(&downstream)
            .expect("all nodes have a recorded in-degree");
        *degree -= 1;
        if *degree == 0 {
            ready.push(Reverse((graph[downstream].clone(), downstream)));
        }
    }
}

struct Visitor {
    root: AbsoluteSystemPathBuf,
    base_cache: BaseCacheConfig,
    env: EnvironmentMap,
    tracker: RunTracker,
    manager: ProcessManager,
}

impl Visitor {
    async fn visit(&self, task: ScheduledTask) -> Result<TaskExecution, Error> {
        let prefix = ui::task_prefix(task.key.as_str());
        let package_dir = self.root.resolve(&task.package_dir);

        let mut state_paths = None;
        if let Some(cache) = task.config.cache.as_config() {
            let paths = TaskStatePaths::new(&package_dir, &task.task_name);
            let outcome = self.build_manifest(&task, cache, &package_dir, &paths)?;
            self.tracker.set_cache_key(&task.key, outcome.hash.clone());

            let miss = task.force || !outcome.had_previous || outcome.did_change;
            if !miss {
                self.capture_outputs(&task, cache, &package_dir)?;
                println!("{prefix}cache hit, skipping");
                return Ok(TaskExecution::Hit);
            }
            if task.force {
                println!("{prefix}cache bypassed with --force");
            } else if !outcome.had_previous {
                println!("{prefix}cache miss, no previous run");
            } else {
                let diff = self
                    .root
                    .anchor(paths.diff())
                    .map(|anchored| anchored.to_string())
                    .unwrap_or_else(|_| paths.diff().to_string());
                println!("{prefix}cache miss, inputs changed (see {diff})");
            }
            state_paths = Some(paths);
        }

        let exit = self.run_command(&task, &package_dir, &prefix).await?;
        if exit.success() {
            if let Some(cache) = task.config.cache.as_config() {
                self.capture_outputs(&task, cache, &package_dir)?;
            }
            Ok(TaskExecution::Ran)
        } else {
            // a failed command's manifest is discarded so the next run
            // re-executes regardless of further input changes
            if let Some(paths) = state_paths {
                paths.remove_manifest()?;
            }
            match exit {
                ChildExit::Finished(code) => println!("{prefix}command failed (exit {code})"),
                _ => println!("{prefix}command failed"),
            }
            Ok(TaskExecution::Failed(exit))
        }
    }

    /// Assembles the manifest in canonical order: upstream task inputs,
    /// upstream package inputs, env vars, then files.
    fn build_manifest(
        &self,
        task: &ScheduledTask,
        cache: &CacheConfig,
        package_dir: &AbsoluteSystemPath,
        paths: &TaskStatePaths,
    ) -> Result<ManifestOutcome, Error> {
        let mut builder = ManifestBuilder::new(paths.clone())?;

        for resolved in task
            .runs_after_keys
            .iter()
            .filter(|resolved| resolved.inherits_input)
        {
            let hash = self.upstream_cache_key(&resolved.key, &task.key)?;
            builder.update(InputKind::UpstreamTaskInputs, resolved.key.as_str(), hash, None)?;
        }

        if task.config.run_type != RunType::Independent && cache.inherits_input_from_dependencies {
            for upstream in &task.dep_task_keys {
                let hash = self.upstream_cache_key(upstream, &task.key)?;
                builder.update(InputKind::UpstreamPackageInputs, upstream.as_str(), hash, None)?;
            }
        }

        let env_names: std::collections::BTreeSet<&str> = self
            .base_cache
            .env_inputs
            .iter()
            .chain(cache.env_inputs.iter())
            .map(String::as_str)
            .collect();
        for name in env_names {
            let value = self.env.get(name).unwrap_or("");
            builder.update(InputKind::EnvVar, name, lazyrepo_hash::hash_string(value), None)?;
        }

        let extra_files = self.extra_files(task, cache);
        let files = enumerate_inputs(&self.root, package_dir, &self.base_cache, cache, &extra_files)?;
        for file in files {
            let absolute = self.root.resolve(&file);
            let meta = mtime_millis(&absolute)?;
            if !builder.copy_line_over_if_meta_is_same(InputKind::File, file.as_str(), &meta)? {
                let hash = lazyrepo_hash::hash_file(&absolute)?;
                builder.update(InputKind::File, file.as_str(), hash, Some(meta))?;
            }
        }

        Ok(builder.end()?)
    }

    fn upstream_cache_key(&self, upstream: &TaskKey, dependent: &TaskKey) -> Result<String, Error> {
        self.tracker
            .cache_key(upstream)
            .ok_or_else(|| Error::MissingUpstreamKey {
                upstream: upstream.to_string(),
                dependent: dependent.to_string(),
            })
    }

    /// Output files handed down from upstream tasks: `runsAfter` entries
    /// with `usesOutput`, plus local dependencies' same-task outputs unless
    /// the cache config opts out.
    fn extra_files(&self, task: &ScheduledTask, cache: &CacheConfig) -> Vec<AnchoredSystemPathBuf> {
        let mut extra = Vec::new();
        for resolved in &task.runs_after_keys {
            if resolved.uses_output {
                extra.extend(self.tracker.output_files(&resolved.key));
            }
        }
        if task.config.run_type != RunType::Independent && cache.uses_output_from_dependencies {
            for upstream in &task.dep_task_keys {
                extra.extend(self.tracker.output_files(upstream));
            }
        }
        extra
    }

    fn capture_outputs(
        &self,
        task: &ScheduledTask,
        cache: &CacheConfig,
        package_dir: &AbsoluteSystemPath,
    ) -> Result<(), Error> {
        let mut captured = Vec::new();
        for file in lazyrepo_globwalk::globwalk_files(
            package_dir,
            &cache.outputs.include,
            &cache.outputs.exclude,
        )? {
            captured.push(self.root.anchor(&package_dir.resolve(&file))?);
        }
        self.tracker.set_output_files(&task.key, captured);
        Ok(())
    }

    async fn run_command(
        &self,
        task: &ScheduledTask,
        package_dir: &AbsoluteSystemPath,
        prefix: &str,
    ) -> Result<ChildExit, Error> {
        let mut script = task.command.clone();
        for arg in &task.extra_args {
            script.push(' ');
            script.push_str(arg);
        }

        let mut bin_dirs = vec![self.root.join_components(&["node_modules", ".bin"])];
        let package_bin = package_dir.join_components(&["node_modules", ".bin"]);
        if package_bin != bin_dirs[0] {
            bin_dirs.insert(0, package_bin);
        }
        let command =
            Command::shell(script, package_dir).with_env(self.env.child_env(&bin_dirs));

        let Some(child) = self.manager.spawn(command) else {
            // the manager is closing; report as killed rather than spawning
            return Ok(ChildExit::Killed);
        };
        let mut child = child?;
        let writer = PrefixedWriter::new(prefix.to_string(), std::io::stdout());
        Ok(child.wait_with_piped_outputs(writer).await?)
    }
}

fn mtime_millis(path: &AbsoluteSystemPath) -> Result<String, std::io::Error> {
    let modified = path.metadata()?.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    Ok(millis.to_string())
}
