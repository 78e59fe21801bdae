use std::collections::BTreeMap;

use lazyrepo_paths::AbsoluteSystemPathBuf;

#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';

/// The environment as captured once at startup. Every env-var read the
/// runner performs goes through this snapshot, so one invocation hashes a
/// consistent view even if the process environment mutates mid-run.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentMap(BTreeMap<String, String>);

impl EnvironmentMap {
    pub fn infer() -> Self {
        Self(std::env::vars().collect())
    }

    /// A fixed snapshot, mainly for tests that need a hermetic environment.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(vars.into_iter().collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The full environment for a child process: the snapshot with
    /// `bin_dirs` prepended to `PATH` so package-local tools resolve first.
    pub fn child_env(&self, bin_dirs: &[AbsoluteSystemPathBuf]) -> BTreeMap<String, String> {
        let mut env = self.0.clone();
        if !bin_dirs.is_empty() {
            let existing = env.remove("PATH").unwrap_or_default();
            let mut path = String::new();
            for dir in bin_dirs {
                path.push_str(dir.as_str());
                path.push(PATH_LIST_SEPARATOR);
            }
            path.push_str(&existing);
            env.insert("PATH".to_string(), path);
        }
        env
    }
}
