use camino::Utf8Path;
use lazyrepo_manifest::LAZY_DIR_NAME;
use lazyrepo_repository::PackageGraph;
use tracing::debug;

use crate::cli::Error;

/// Removes every package's `.lazy` directory (and the root's), dropping all
/// cached manifests and diffs.
pub fn run(cwd: Option<&Utf8Path>) -> Result<i32, Error> {
    let (_invocation_dir, repo) = super::repo_state(cwd)?;
    let package_graph = PackageGraph::build(&repo.root, repo.package_manager)?;

    let mut removed = 0usize;
    let mut dirs = vec![repo.root.join_component(LAZY_DIR_NAME)];
    for package in package_graph.packages() {
        dirs.push(repo.root.resolve(&package.dir).join_component(LAZY_DIR_NAME));
    }
    for dir in dirs {
        if dir.is_dir() {
            debug!("removing {dir}");
            dir.remove_dir_all().map_err(lazyrepo_paths::PathError::Io)?;
            removed += 1;
        }
    }
    println!("removed {removed} cache director{}", if removed == 1 { "y" } else { "ies" });
    Ok(0)
}
