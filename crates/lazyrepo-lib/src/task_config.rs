//! The configuration schema: what `lazy.config.json` declares and the
//! defaults that apply when it doesn't.

use std::collections::BTreeMap;

use serde::Deserialize;

/// How a task maps onto packages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    /// One node per package, ordered after the same task in the package's
    /// local dependencies.
    #[default]
    Dependent,
    /// One node per package, no ordering between packages.
    Independent,
    /// A single node at the workspace root.
    TopLevel,
}

/// Declared ordering against another task, independent of package
/// dependencies.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RunsAfter {
    /// Fold the other task's input manifest hash into this task's manifest.
    pub inherits_input: bool,
    /// Treat the other task's output files as inputs to this task.
    pub uses_output: bool,
}

impl Default for RunsAfter {
    fn default() -> Self {
        RunsAfter {
            inherits_input: false,
            uses_output: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct GlobSpec {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for GlobSpec {
    fn default() -> Self {
        GlobSpec {
            include: vec!["**/*".to_string()],
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Env vars whose values are part of this task's fingerprint.
    pub env_inputs: Vec<String>,
    /// Fold the same task's manifest hash from each local dependency in.
    pub inherits_input_from_dependencies: bool,
    /// Package-relative input globs.
    pub inputs: GlobSpec,
    /// Package-relative output globs, captured after the task runs.
    pub outputs: GlobSpec,
    /// Treat local dependencies' captured outputs as inputs to this task.
    pub uses_output_from_dependencies: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            env_inputs: Vec::new(),
            inherits_input_from_dependencies: true,
            inputs: GlobSpec::default(),
            outputs: GlobSpec::default(),
            uses_output_from_dependencies: true,
        }
    }
}

/// `cache` is either the literal string `"none"` or a [`CacheConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CacheSetting {
    Keyword(CacheKeyword),
    Config(CacheConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeyword {
    None,
}

impl Default for CacheSetting {
    fn default() -> Self {
        CacheSetting::Config(CacheConfig::default())
    }
}

impl CacheSetting {
    /// `None` means caching is disabled and the task always runs.
    pub fn as_config(&self) -> Option<&CacheConfig> {
        match self {
            CacheSetting::Keyword(CacheKeyword::None) => None,
            CacheSetting::Config(config) => Some(config),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TaskConfig {
    pub run_type: RunType,
    /// Shell command to run; falls back to the package's script of the same
    /// name when absent.
    pub base_command: Option<String>,
    pub runs_after: BTreeMap<String, RunsAfter>,
    pub parallel: bool,
    pub cache: CacheSetting,
}

impl Default for TaskConfig {
    fn default() -> Self {
        TaskConfig {
            run_type: RunType::default(),
            base_command: None,
            runs_after: BTreeMap::new(),
            parallel: true,
            cache: CacheSetting::default(),
        }
    }
}

/// Workspace-wide inputs folded into every cacheable task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct BaseCacheConfig {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub env_inputs: Vec<String>,
}

/// Expands to the workspace root in base-cache globs.
pub const ROOT_DIR_TOKEN: &str = "<rootDir>";

impl Default for BaseCacheConfig {
    fn default() -> Self {
        BaseCacheConfig {
            includes: vec![
                format!("{ROOT_DIR_TOKEN}/{{yarn.lock,pnpm-lock.yaml,package-lock.json}}"),
                format!("{ROOT_DIR_TOKEN}/lazy.config.*"),
            ],
            excludes: Vec::new(),
            env_inputs: Vec::new(),
        }
    }
}

/// The shape of a `lazy.config.json` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LazyConfig {
    pub base_cache_config: Option<BaseCacheConfig>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaskConfig::default();
        assert_eq!(config.run_type, RunType::Dependent);
        assert!(config.parallel);
        let cache = config.cache.as_config().unwrap();
        assert!(cache.inherits_input_from_dependencies);
        assert!(cache.uses_output_from_dependencies);
        assert_eq!(cache.inputs.include, vec!["**/*"]);
        assert!(cache.inputs.exclude.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let parsed: LazyConfig = serde_json::from_str(
            r#"{
                "baseCacheConfig": {
                    "includes": ["<rootDir>/tsconfig.json"],
                    "envInputs": ["NODE_ENV"]
                },
                "tasks": {
                    "build": {
                        "runsAfter": {"codegen": {"inheritsInput": true, "usesOutput": false}},
                        "cache": {
                            "envInputs": ["CI"],
                            "inputs": {"include": ["src/**"], "exclude": ["**/*.test.ts"]},
                            "outputs": {"include": ["dist/**"]}
                        }
                    },
                    "prepare": {"runType": "top-level", "baseCommand": "echo ready"},
                    "dev": {"cache": "none", "parallel": false}
                }
            }"#,
        )
        .unwrap();

        let base = parsed.base_cache_config.unwrap();
        assert_eq!(base.includes, vec!["<rootDir>/tsconfig.json"]);
        assert_eq!(base.env_inputs, vec!["NODE_ENV"]);

        let build = &parsed.tasks["build"];
        let runs_after = &build.runs_after["codegen"];
        assert!(runs_after.inherits_input);
        assert!(!runs_after.uses_output);
        let cache = build.cache.as_config().unwrap();
        assert_eq!(cache.env_inputs, vec!["CI"]);
        assert_eq!(cache.inputs.include, vec!["src/**"]);
        assert_eq!(cache.outputs.include, vec!["dist/**"]);

        let prepare = &parsed.tasks["prepare"];
        assert_eq!(prepare.run_type, RunType::TopLevel);
        assert_eq!(prepare.base_command.as_deref(), Some("echo ready"));

        let dev = &parsed.tasks["dev"];
        assert!(dev.cache.as_config().is_none());
        assert!(!dev.parallel);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<LazyConfig>(r#"{"task": {}}"#).is_err());
        assert!(
            serde_json::from_str::<LazyConfig>(r#"{"tasks": {"build": {"runsAfter": []}}}"#)
                .is_err()
        );
    }

    #[test]
    fn test_runs_after_defaults() {
        let parsed: LazyConfig =
            serde_json::from_str(r#"{"tasks": {"build": {"runsAfter": {"codegen": {}}}}}"#)
                .unwrap();
        let runs_after = &parsed.tasks["build"].runs_after["codegen"];
        assert!(!runs_after.inherits_input);
        assert!(runs_after.uses_output);
    }
}
