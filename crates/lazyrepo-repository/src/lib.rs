//! Workspace discovery: repo-root inference, package-manager detection, and
//! the package graph (member packages plus their in-workspace dependency
//! edges). Built once per invocation; immutable afterwards.

mod inference;
mod package_graph;
mod package_json;
mod package_manager;

pub use inference::RepoState;
pub use package_graph::{PackageGraph, PackageInfo};
pub use package_json::{PackageJson, Workspaces};
pub use package_manager::PackageManager;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "could not find a workspace root above {cwd} (no pnpm-lock.yaml, yarn.lock, or \
         package-lock.json)"
    )]
    MissingRoot { cwd: String },
    #[error("unable to read {path}: {err}")]
    Io {
        path: String,
        #[source]
        err: std::io::Error,
    },
    #[error("unable to parse {path}: {err}")]
    Json {
        path: String,
        #[source]
        err: serde_json::Error,
    },
    #[error("unable to parse {path}: {err}")]
    Yaml {
        path: String,
        #[source]
        err: serde_yaml::Error,
    },
    #[error("packages {first} and {second} share the name {name:?}")]
    DuplicatePackageName {
        name: String,
        first: String,
        second: String,
    },
    #[error(transparent)]
    Walk(#[from] lazyrepo_globwalk::WalkError),
    #[error(transparent)]
    Path(#[from] lazyrepo_paths::PathError),
}
