use camino::Utf8Path;
use lazyrepo_paths::{AbsoluteSystemPathBuf, AnchoredSystemPathBuf};
use lazyrepo_process::ProcessManager;
use lazyrepo_repository::PackageGraph;
use tracing::debug;

use crate::{
    cli::Error,
    config::ConfigLoader,
    engine::{EngineBuilder, RunRequest},
    env::EnvironmentMap,
    run::{Run, RunOpts, RunSummary, TaskStatus},
};

/// Exit code used when the run is torn down by a terminating signal.
const SIGNAL_EXIT_CODE: i32 = 130;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    cwd: Option<&Utf8Path>,
    tasks: &[String],
    filter: &[camino::Utf8PathBuf],
    force: bool,
    concurrency: Option<usize>,
    pass_through_args: &[String],
) -> Result<i32, Error> {
    let (invocation_dir, repo) = super::repo_state(cwd)?;
    debug!(
        "workspace root {} ({})",
        repo.root, repo.package_manager
    );

    let package_graph = PackageGraph::build(&repo.root, repo.package_manager)?;
    let config = ConfigLoader::load(&package_graph)?;
    let filter_paths = resolve_filters(&repo.root, &invocation_dir, filter)?;

    let requests: Vec<RunRequest> = tasks
        .iter()
        .map(|task_name| RunRequest {
            task_name: task_name.clone(),
            filter_paths: filter_paths.clone(),
            force,
            extra_args: pass_through_args.to_vec(),
        })
        .collect();
    let engine = EngineBuilder::new(&package_graph, &config)
        .with_requests(requests)
        .build()?;
    debug!("scheduled {} tasks", engine.len());

    let mut opts = RunOpts::default();
    if let Some(concurrency) = concurrency {
        opts.concurrency = concurrency.max(1);
    }
    let run = Run::new(
        repo.root.clone(),
        engine,
        config.base_cache_config(),
        EnvironmentMap::infer(),
        ProcessManager::new(),
        opts,
    );

    tokio::select! {
        summary = run.execute() => {
            let summary = summary?;
            print_summary(&summary);
            Ok(summary.exit_code())
        }
        _ = tokio::signal::ctrl_c() => {
            run.close();
            eprintln!("interrupted, stopping tasks");
            Ok(SIGNAL_EXIT_CODE)
        }
    }
}

/// Filter paths may be given absolute or relative to the invocation
/// directory; either way they must land inside the workspace.
fn resolve_filters(
    root: &lazyrepo_paths::AbsoluteSystemPath,
    invocation_dir: &AbsoluteSystemPathBuf,
    filter: &[camino::Utf8PathBuf],
) -> Result<Vec<AnchoredSystemPathBuf>, Error> {
    filter
        .iter()
        .map(|path| {
            let absolute = if path.is_absolute() {
                AbsoluteSystemPathBuf::new(path.clone())?
            } else {
                let mut components: Vec<&str> = Vec::new();
                for component in path.components() {
                    components.push(component.as_str());
                }
                invocation_dir.join_components(&components)
            };
            root.anchor(&absolute)
                .map_err(|_| Error::FilterOutsideWorkspace {
                    path: path.to_string(),
                    root: root.to_string(),
                })
        })
        .collect()
}

fn print_summary(summary: &RunSummary) {
    let eager = summary.count(|status| status == TaskStatus::SuccessEager);
    let lazy = summary.count(|status| status == TaskStatus::SuccessLazy);
    let skipped = summary.count(|status| status == TaskStatus::Skipped);
    let failed: Vec<_> = summary.failed().collect();

    let mut line = format!("tasks: {eager} executed, {lazy} cached");
    if skipped > 0 {
        line.push_str(&format!(", {skipped} skipped"));
    }
    if !failed.is_empty() {
        line.push_str(&format!(", {} failed", failed.len()));
    }
    println!("{line}");
    for (key, status) in failed {
        println!("  {key}: {status}");
    }
}
