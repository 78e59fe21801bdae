//! Canonical task identifiers.
//!
//! A [`TaskKey`] names one `(task, package directory)` pair as it appears in
//! the task graph, rendered `"{task}::{dir}"` where `dir` is the package
//! directory anchored to the workspace root, or [`ROOT_DIR_LABEL`] for the
//! workspace root itself. The rendered form is the map key, the sort key for
//! topological tie-breaking, and the `id` of upstream manifest entries, so
//! `Ord` compares the rendered string directly.

use std::fmt;

use lazyrepo_paths::{AnchoredSystemPath, AnchoredSystemPathBuf};
use serde::Serialize;

pub const TASK_DELIMITER: &str = "::";
pub const ROOT_DIR_LABEL: &str = "<rootDir>";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskKey(String);

#[derive(Debug, thiserror::Error)]
#[error("no task name found in task key '{input}'")]
pub struct TaskKeyError {
    input: String,
}

impl TaskKey {
    /// Builds the key for `task` in the package rooted at `dir`, where the
    /// empty anchored path means the workspace root.
    pub fn new(task: &str, dir: &AnchoredSystemPath) -> Self {
        debug_assert!(!task.contains(TASK_DELIMITER));
        if dir.is_empty() {
            TaskKey(format!("{task}{TASK_DELIMITER}{ROOT_DIR_LABEL}"))
        } else {
            TaskKey(format!("{task}{TASK_DELIMITER}{dir}"))
        }
    }

    pub fn task(&self) -> &str {
        self.split().0
    }

    /// The package directory, anchored to the workspace root. Empty for the
    /// workspace root.
    pub fn dir(&self) -> &AnchoredSystemPath {
        let dir = self.split().1;
        if dir == ROOT_DIR_LABEL {
            AnchoredSystemPath::new("").expect("empty path is anchored")
        } else {
            AnchoredSystemPath::new(dir).expect("task keys hold anchored dirs")
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        self.0
            .split_once(TASK_DELIMITER)
            .expect("task keys always contain a delimiter")
    }
}

impl TryFrom<&str> for TaskKey {
    type Error = TaskKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.split_once(TASK_DELIMITER) {
            None | Some(("", _)) | Some((_, "")) => Err(TaskKeyError {
                input: value.to_string(),
            }),
            Some((task, dir)) => Ok(if dir == ROOT_DIR_LABEL {
                TaskKey::new(task, AnchoredSystemPath::new("").expect("empty path is anchored"))
            } else {
                TaskKey(format!("{task}{TASK_DELIMITER}{dir}"))
            }),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TaskKey> for String {
    fn from(value: TaskKey) -> Self {
        value.0
    }
}

/// Convenience constructor from an owned anchored dir.
impl TaskKey {
    pub fn for_package(task: &str, dir: &AnchoredSystemPathBuf) -> Self {
        Self::new(task, dir.as_anchored_path())
    }
}
