use std::io;

use lazyrepo_paths::{AbsoluteSystemPath, AbsoluteSystemPathBuf};

/// Per-package state directory name. Always excluded from input enumeration.
pub const LAZY_DIR_NAME: &str = ".lazy";

const MANIFESTS_DIR: &str = "manifests";
const DIFFS_DIR: &str = "diffs";

/// Filename-safe slug for a task name.
///
/// Lowercases and projects onto `[a-z0-9._-]`. When the projection is lossy
/// (or changed the case), a short content-hash suffix keeps distinct task
/// names mapping to distinct files.
pub fn slug(task_name: &str) -> String {
    let projected: String = task_name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if projected == task_name {
        projected
    } else {
        let disambiguator = lazyrepo_hash::hash_string(task_name);
        format!("{projected}-{}", &disambiguator[..8])
    }
}

/// The on-disk locations of one task's cache state within its package.
#[derive(Debug, Clone)]
pub struct TaskStatePaths {
    manifest: AbsoluteSystemPathBuf,
    next: AbsoluteSystemPathBuf,
    diff: AbsoluteSystemPathBuf,
}

impl TaskStatePaths {
    pub fn new(package_dir: &AbsoluteSystemPath, task_name: &str) -> Self {
        let slug = slug(task_name);
        TaskStatePaths {
            manifest: package_dir.join_components(&[LAZY_DIR_NAME, MANIFESTS_DIR, &slug]),
            next: package_dir.join_components(&[
                LAZY_DIR_NAME,
                MANIFESTS_DIR,
                &format!("{slug}.next"),
            ]),
            diff: package_dir.join_components(&[LAZY_DIR_NAME, DIFFS_DIR, &slug]),
        }
    }

    pub fn manifest(&self) -> &AbsoluteSystemPath {
        &self.manifest
    }

    pub fn next(&self) -> &AbsoluteSystemPath {
        &self.next
    }

    pub fn diff(&self) -> &AbsoluteSystemPath {
        &self.diff
    }

    /// Discards the published manifest, forcing the next run to re-execute.
    pub fn remove_manifest(&self) -> Result<(), io::Error> {
        match self.manifest.remove_file() {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    #[test_case("build", "build" ; "plain name passes through")]
    #[test_case("test.unit", "test.unit" ; "dots kept")]
    #[test_case("build_fast", "build_fast" ; "underscores kept")]
    fn test_slug_identity(input: &str, expected: &str) {
        assert_eq!(slug(input), expected);
    }

    #[test]
    fn test_slug_lossy_names_stay_distinct() {
        let a = slug("build:web");
        let b = slug("build:api");
        let c = slug("build-web");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("build-web-"));
    }

    #[test]
    fn test_slug_is_deterministic() {
        assert_eq!(slug("Build It"), slug("Build It"));
    }

    #[test]
    fn test_state_paths() {
        let package = AbsoluteSystemPathBuf::new("/repo/packages/utils").unwrap();
        let paths = TaskStatePaths::new(&package, "build");
        assert_eq!(
            paths.manifest().as_str(),
            "/repo/packages/utils/.lazy/manifests/build"
        );
        assert_eq!(
            paths.next().as_str(),
            "/repo/packages/utils/.lazy/manifests/build.next"
        );
        assert_eq!(paths.diff().as_str(), "/repo/packages/utils/.lazy/diffs/build");
    }
}
