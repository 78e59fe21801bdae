use lazyrepo_graph_utils as graph;
use lazyrepo_paths::{AnchoredSystemPath, AnchoredSystemPathBuf};
use lazyrepo_repository::{PackageGraph, PackageInfo};
use lazyrepo_task_id::TaskKey;
use tracing::debug;

use super::{Building, Engine, ScheduledTask};
use crate::{
    config::ConfigLoader,
    task_config::{RunType, TaskConfig},
};

/// One task name as requested on the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub task_name: String,
    pub filter_paths: Vec<AnchoredSystemPathBuf>,
    pub force: bool,
    pub extra_args: Vec<String>,
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    #[error("no package has a runnable task named `{task_name}`")]
    #[diagnostic(help("a task is runnable when the package's scripts define it or a lazy config sets baseCommand"))]
    NoTasksMatched { task_name: String },
    #[error(transparent)]
    Graph(#[from] graph::Error),
}

pub struct EngineBuilder<'a> {
    package_graph: &'a PackageGraph,
    config: &'a ConfigLoader,
    requests: Vec<RunRequest>,
}

impl<'a> EngineBuilder<'a> {
    pub fn new(package_graph: &'a PackageGraph, config: &'a ConfigLoader) -> Self {
        Self {
            package_graph,
            config,
            requests: Vec::new(),
        }
    }

    pub fn with_requests(mut self, requests: impl IntoIterator<Item = RunRequest>) -> Self {
        self.requests.extend(requests);
        self
    }

    pub fn build(self) -> Result<Engine, Error> {
        let mut engine = Engine::<Building>::new();

        for request in &self.requests {
            self.add_nodes_for_request(&mut engine, request)?;
        }
        self.add_edges(&mut engine);

        Ok(engine.seal()?)
    }

    fn add_nodes_for_request(
        &self,
        engine: &mut Engine<Building>,
        request: &RunRequest,
    ) -> Result<(), Error> {
        let mut matched = false;
        match self.config.topology_run_type(&request.task_name) {
            RunType::TopLevel => {
                let root = self.package_graph.root_package();
                if let Some(task) = self.scheduled_task(request, root) {
                    engine.add_task(task);
                    matched = true;
                }
            }
            RunType::Dependent | RunType::Independent => {
                for package in self.package_graph.packages() {
                    if !matches_filter(&request.filter_paths, &package.dir) {
                        continue;
                    }
                    if let Some(task) = self.scheduled_task(request, package) {
                        engine.add_task(task);
                        matched = true;
                    }
                }
            }
        }
        if matched {
            Ok(())
        } else {
            Err(Error::NoTasksMatched {
                task_name: request.task_name.clone(),
            })
        }
    }

    /// Resolves the node for `(package, task)`, or nothing when the package
    /// has no way to run the task.
    fn scheduled_task(&self, request: &RunRequest, package: &PackageInfo) -> Option<ScheduledTask> {
        let config = self.config.task_config(&package.dir, &request.task_name);
        let command = resolve_command(&config, package, &request.task_name)?;
        Some(ScheduledTask {
            key: TaskKey::for_package(&request.task_name, &package.dir),
            task_name: request.task_name.clone(),
            package_name: package.name.clone(),
            package_dir: package.dir.clone(),
            config,
            command,
            force: request.force,
            extra_args: request.extra_args.clone(),
            runs_after_keys: Vec::new(),
            dep_task_keys: Vec::new(),
        })
    }

    fn add_edges(&self, engine: &mut Engine<Building>) {
        let tasks: Vec<ScheduledTask> = engine.tasks_snapshot();
        for task in &tasks {
            let mut dep_task_keys = Vec::new();
            if task.config.run_type == RunType::Dependent {
                if let Some(package) = self.package_graph.package(&task.package_name) {
                    for dep_name in &package.local_deps {
                        let dep = self
                            .package_graph
                            .package(dep_name)
                            .expect("local deps name workspace members");
                        let upstream = TaskKey::for_package(&task.task_name, &dep.dir);
                        if engine.has_task(&upstream) {
                            engine.connect(&upstream, &task.key);
                            dep_task_keys.push(upstream);
                        }
                    }
                }
            }
            dep_task_keys.sort();

            let mut runs_after_keys = Vec::new();
            for (other_task, runs_after) in &task.config.runs_after {
                let upstream = self.runs_after_key(other_task, &task.package_dir);
                if engine.has_task(&upstream) {
                    engine.connect(&upstream, &task.key);
                    runs_after_keys.push(super::ResolvedRunsAfter {
                        key: upstream,
                        inherits_input: runs_after.inherits_input,
                        uses_output: runs_after.uses_output,
                    });
                } else {
                    debug!(
                        "runsAfter target {upstream} of {} is not scheduled this run",
                        task.key
                    );
                }
            }
            runs_after_keys.sort_by(|a, b| a.key.cmp(&b.key));

            let node = engine
                .tasks
                .get_mut(&task.key)
                .expect("snapshot keys exist in engine");
            node.dep_task_keys = dep_task_keys;
            node.runs_after_keys = runs_after_keys;
        }
    }

    /// Where a `runsAfter` reference points: the single root node for
    /// top-level tasks, the same package's node otherwise.
    fn runs_after_key(&self, other_task: &str, package_dir: &AnchoredSystemPath) -> TaskKey {
        match self.config.topology_run_type(other_task) {
            RunType::TopLevel => TaskKey::new(
                other_task,
                AnchoredSystemPath::new("").expect("empty path is anchored"),
            ),
            _ => TaskKey::new(other_task, package_dir),
        }
    }
}

fn resolve_command(config: &TaskConfig, package: &PackageInfo, task_name: &str) -> Option<String> {
    config
        .base_command
        .clone()
        .or_else(|| package.package_json.script(task_name).map(str::to_string))
}

/// A package passes the filter when any filter path and the package dir are
/// prefix-related in either direction, so `--filter packages` selects every
/// package below it and `--filter packages/app/src` still selects the
/// package that owns that subtree.
fn matches_filter(filter_paths: &[AnchoredSystemPathBuf], package_dir: &AnchoredSystemPath) -> bool {
    filter_paths.is_empty()
        || filter_paths
            .iter()
            .any(|filter| filter.contains(package_dir) || package_dir.contains(filter))
}

impl Engine<Building> {
    fn tasks_snapshot(&self) -> Vec<ScheduledTask> {
        self.tasks.values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use lazyrepo_paths::AbsoluteSystemPathBuf;
    use lazyrepo_repository::PackageManager;
    use pretty_assertions::assert_eq;

    use super::*;

    fn write(root: &std::path::Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn workspace(extra_files: &[(&str, &str)]) -> (tempfile::TempDir, PackageGraph) {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "yarn.lock", "");
        write(
            dir.path(),
            "package.json",
            r#"{"name": "monorepo", "workspaces": ["packages/*"], "scripts": {"prepare": "echo prep"}}"#,
        );
        write(
            dir.path(),
            "packages/utils/package.json",
            r#"{"name": "utils", "scripts": {"build": "echo utils", "test": "echo test-utils"}}"#,
        );
        write(
            dir.path(),
            "packages/core/package.json",
            r#"{"name": "core", "dependencies": {"utils": "*"}, "scripts": {"build": "echo core", "test": "echo test-core"}}"#,
        );
        for (rel, contents) in extra_files {
            write(dir.path(), rel, contents);
        }
        let root = AbsoluteSystemPathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let graph = PackageGraph::build(&root, PackageManager::Yarn).unwrap();
        (dir, graph)
    }

    fn request(task: &str) -> RunRequest {
        RunRequest {
            task_name: task.to_string(),
            filter_paths: Vec::new(),
            force: false,
            extra_args: Vec::new(),
        }
    }

    fn keys(engine: &Engine) -> Vec<&str> {
        engine
            .sorted_task_keys()
            .iter()
            .map(|key| key.as_str())
            .collect()
    }

    #[test]
    fn test_dependent_tasks_follow_package_edges() {
        let (_dir, graph) = workspace(&[]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([request("build")])
            .build()
            .unwrap();
        assert_eq!(
            keys(&engine),
            vec!["build::packages/utils", "build::packages/core"]
        );
        let core_key = TaskKey::try_from("build::packages/core").unwrap();
        let deps = engine.dependencies(&core_key);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].as_str(), "build::packages/utils");
    }

    #[test]
    fn test_independent_tasks_have_no_package_edges() {
        let (_dir, graph) = workspace(&[(
            "lazy.config.json",
            r#"{"tasks": {"test": {"runType": "independent"}}}"#,
        )]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([request("test")])
            .build()
            .unwrap();
        let core_key = TaskKey::try_from("test::packages/core").unwrap();
        assert!(engine.dependencies(&core_key).is_empty());
    }

    #[test]
    fn test_top_level_task_is_single_root_node() {
        let (_dir, graph) = workspace(&[(
            "lazy.config.json",
            r#"{"tasks": {"prepare": {"runType": "top-level"}}}"#,
        )]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([request("prepare")])
            .build()
            .unwrap();
        assert_eq!(keys(&engine), vec!["prepare::<rootDir>"]);
    }

    #[test]
    fn test_runs_after_top_level_edge() {
        let (_dir, graph) = workspace(&[(
            "lazy.config.json",
            r#"{"tasks": {
                "prepare": {"runType": "top-level"},
                "build": {"runsAfter": {"prepare": {}}}
            }}"#,
        )]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([request("build"), request("prepare")])
            .build()
            .unwrap();
        let utils_key = TaskKey::try_from("build::packages/utils").unwrap();
        let deps = engine.dependencies(&utils_key);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].as_str(), "prepare::<rootDir>");
        // prepare runs before every build
        assert_eq!(keys(&engine)[0], "prepare::<rootDir>");
    }

    #[test]
    fn test_runs_after_same_package_edge() {
        let (_dir, graph) = workspace(&[(
            "lazy.config.json",
            r#"{"tasks": {"test": {"runsAfter": {"build": {}}}}}"#,
        )]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([request("build"), request("test")])
            .build()
            .unwrap();
        let utils_test = TaskKey::try_from("test::packages/utils").unwrap();
        let deps = engine.dependencies(&utils_test);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].as_str(), "build::packages/utils");
    }

    #[test]
    fn test_filter_restricts_packages() {
        let (_dir, graph) = workspace(&[]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([RunRequest {
                filter_paths: vec![AnchoredSystemPathBuf::new("packages/utils").unwrap()],
                ..request("build")
            }])
            .build()
            .unwrap();
        assert_eq!(keys(&engine), vec!["build::packages/utils"]);
    }

    #[test]
    fn test_unknown_task_is_fatal() {
        let (_dir, graph) = workspace(&[]);
        let config = ConfigLoader::load(&graph).unwrap();
        let result = EngineBuilder::new(&graph, &config)
            .with_requests([request("deploy")])
            .build();
        assert!(matches!(result, Err(Error::NoTasksMatched { .. })));
    }

    #[test]
    fn test_runs_after_cycle_is_fatal() {
        let (_dir, graph) = workspace(&[(
            "lazy.config.json",
            r#"{"tasks": {
                "build": {"runsAfter": {"test": {}}},
                "test": {"runsAfter": {"build": {}}}
            }}"#,
        )]);
        let config = ConfigLoader::load(&graph).unwrap();
        let result = EngineBuilder::new(&graph, &config)
            .with_requests([request("build"), request("test")])
            .build();
        assert!(matches!(result, Err(Error::Graph(_))));
    }

    #[test]
    fn test_repeated_request_merges_force() {
        let (_dir, graph) = workspace(&[]);
        let config = ConfigLoader::load(&graph).unwrap();
        let engine = EngineBuilder::new(&graph, &config)
            .with_requests([
                request("build"),
                RunRequest {
                    force: true,
                    ..request("build")
                },
            ])
            .build()
            .unwrap();
        assert_eq!(engine.len(), 2);
        assert!(engine.tasks().all(|task| task.force));
    }
}
