use std::{collections::BTreeMap, fmt};

use lazyrepo_task_id::TaskKey;

/// Where a task ended up this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    /// Ran its command to a zero exit.
    SuccessEager,
    /// Cache hit; the command never ran.
    SuccessLazy,
    /// Command exited non-zero (or could not run at all).
    Failure(Option<i32>),
    /// Never started because a transitive upstream failed.
    Skipped,
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::SuccessEager | TaskStatus::SuccessLazy)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("pending"),
            TaskStatus::Running => f.write_str("running"),
            TaskStatus::SuccessEager => f.write_str("success"),
            TaskStatus::SuccessLazy => f.write_str("success (cached)"),
            TaskStatus::Failure(Some(code)) => write!(f, "failed (exit {code})"),
            TaskStatus::Failure(None) => f.write_str("failed"),
            TaskStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// The final per-task statuses of one run.
#[derive(Debug)]
pub struct RunSummary {
    statuses: BTreeMap<TaskKey, TaskStatus>,
}

impl RunSummary {
    pub fn new(statuses: impl IntoIterator<Item = (TaskKey, TaskStatus)>) -> Self {
        RunSummary {
            statuses: statuses.into_iter().collect(),
        }
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&TaskKey, TaskStatus)> {
        self.statuses.iter().map(|(key, &status)| (key, status))
    }

    pub fn status(&self, key: &TaskKey) -> Option<TaskStatus> {
        self.statuses.get(key).copied()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&TaskKey, TaskStatus)> {
        self.statuses()
            .filter(|(_, status)| matches!(status, TaskStatus::Failure(_)))
    }

    pub fn count(&self, predicate: impl Fn(TaskStatus) -> bool) -> usize {
        self.statuses()
            .filter(|&(_, status)| predicate(status))
            .count()
    }

    /// Zero iff every task succeeded (eagerly or from cache).
    pub fn exit_code(&self) -> i32 {
        if self.statuses().all(|(_, status)| status.is_success()) {
            0
        } else {
            1
        }
    }
}
