use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use lazyrepo_paths::AnchoredSystemPathBuf;
use lazyrepo_task_id::TaskKey;

/// Per-run mutable state, keyed by task. Task nodes themselves stay
/// immutable once the graph is sealed; everything a run learns about a task
/// (its manifest cache key, its captured output files) lands here.
#[derive(Debug, Default, Clone)]
pub struct RunTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    cache_keys: HashMap<TaskKey, String>,
    output_files: HashMap<TaskKey, Vec<AnchoredSystemPathBuf>>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cache_key(&self, key: &TaskKey, hash: String) {
        self.inner
            .lock()
            .expect("run tracker lock")
            .cache_keys
            .insert(key.clone(), hash);
    }

    pub fn cache_key(&self, key: &TaskKey) -> Option<String> {
        self.inner
            .lock()
            .expect("run tracker lock")
            .cache_keys
            .get(key)
            .cloned()
    }

    pub fn set_output_files(&self, key: &TaskKey, files: Vec<AnchoredSystemPathBuf>) {
        self.inner
            .lock()
            .expect("run tracker lock")
            .output_files
            .insert(key.clone(), files);
    }

    /// Captured outputs of `key`, empty when the task captured nothing.
    pub fn output_files(&self, key: &TaskKey) -> Vec<AnchoredSystemPathBuf> {
        self.inner
            .lock()
            .expect("run tracker lock")
            .output_files
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}
