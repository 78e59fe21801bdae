//! Locating and loading `lazy.config.json` files.
//!
//! One config file may exist at the workspace root and one per package. Only
//! the JSON variant is loaded; the script variants of the original tool
//! imply arbitrary code execution at config-load time and are rejected with
//! a pointer at the offending file. More than one variant in a directory is
//! ambiguous and fatal.

use std::collections::HashMap;

use lazyrepo_paths::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPath, AnchoredSystemPathBuf};
use lazyrepo_repository::PackageGraph;
use tracing::debug;

use crate::task_config::{BaseCacheConfig, LazyConfig, RunType, TaskConfig};

pub const CONFIG_STEM: &str = "lazy.config";
const CONFIG_EXTENSIONS: &[&str] = &["json", "js", "cjs", "mjs", "ts", "cts", "mts"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("multiple config files in {dir}: {}", files.join(", "))]
    MultipleConfigFiles { dir: String, files: Vec<String> },
    #[error(
        "unsupported config format {path}: only lazy.config.json can be loaded; re-express the \
         config as JSON"
    )]
    UnsupportedConfigFormat { path: String },
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
}

/// All config files in the workspace, resolved once per invocation.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    root_config: LazyConfig,
    package_configs: HashMap<AnchoredSystemPathBuf, LazyConfig>,
}

impl ConfigLoader {
    pub fn load(package_graph: &PackageGraph) -> Result<Self, Error> {
        let root = package_graph.root();
        let root_config = load_config_in(root)?.unwrap_or_default();
        let mut package_configs = HashMap::new();
        for package in package_graph.packages() {
            let dir = root.resolve(&package.dir);
            if let Some(config) = load_config_in(&dir)? {
                debug!("loaded package config for {}", package.name);
                package_configs.insert(package.dir.clone(), config);
            }
        }
        Ok(ConfigLoader {
            root_config,
            package_configs,
        })
    }

    pub fn base_cache_config(&self) -> BaseCacheConfig {
        self.root_config
            .base_cache_config
            .clone()
            .unwrap_or_default()
    }

    /// The task config governing `(package_dir, task_name)`: the package's
    /// own entry when it has one, else the root entry, else all defaults.
    pub fn task_config(&self, package_dir: &AnchoredSystemPath, task_name: &str) -> TaskConfig {
        self.package_configs
            .get(package_dir)
            .and_then(|config| config.tasks.get(task_name))
            .or_else(|| self.root_config.tasks.get(task_name))
            .cloned()
            .unwrap_or_default()
    }

    /// The run type used to decide a task's node topology. Only the root
    /// config can make a task top-level; per-package configs cannot change a
    /// task's shape, only its caching and command.
    pub fn topology_run_type(&self, task_name: &str) -> RunType {
        self.root_config
            .tasks
            .get(task_name)
            .map(|config| config.run_type)
            .unwrap_or_default()
    }
}

fn load_config_in(dir: &AbsoluteSystemPath) -> Result<Option<LazyConfig>, Error> {
    let candidates: Vec<AbsoluteSystemPathBuf> = CONFIG_EXTENSIONS
        .iter()
        .map(|ext| dir.join_component(&format!("{CONFIG_STEM}.{ext}")))
        .filter(|path| path.is_file())
        .collect();

    match candidates.as_slice() {
        [] => Ok(None),
        [path] => {
            if path.as_str().ends_with(".json") {
                let contents = path.read_to_string().map_err(|err| Error::Io {
                    path: path.to_string(),
                    err,
                })?;
                let config = serde_json::from_str(&contents).map_err(|err| Error::Json {
                    path: path.to_string(),
                    err,
                })?;
                Ok(Some(config))
            } else {
                Err(Error::UnsupportedConfigFormat {
                    path: path.to_string(),
                })
            }
        }
        many => Err(Error::MultipleConfigFiles {
            dir: dir.to_string(),
            files: many
                .iter()
                .filter_map(|path| path.file_name().map(str::to_string))
                .collect(),
        }),
    }
}
