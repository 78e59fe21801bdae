use std::{
    fs,
    io::{BufWriter, Write},
};

use lazyrepo_hash::AggregateHasher;

use crate::{
    codec::{read_manifest, PreviousManifest},
    diff::diff_lines,
    entry::{InputKind, ManifestEntry},
    layout::TaskStatePaths,
    Error,
};

/// Streaming construction of one task's new manifest.
///
/// Entries must arrive in canonical `(kind, id)` order; the builder rejects
/// out-of-order or duplicate entries rather than reordering, because callers
/// that get this wrong have broken fingerprint semantics. Lines stream to
/// `<manifest>.next` as they arrive; [`ManifestBuilder::end`] publishes the
/// result atomically.
///
/// One builder per task per run, used from a single caller.
pub struct ManifestBuilder {
    paths: TaskStatePaths,
    previous: Option<PreviousManifest>,
    writer: BufWriter<fs::File>,
    aggregate: AggregateHasher,
    entries: Vec<ManifestEntry>,
}

/// What [`ManifestBuilder::end`] learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestOutcome {
    /// False iff the new aggregate hash equals the previous manifest's.
    pub did_change: bool,
    /// The new aggregate hash; this is the task's input-manifest cache key.
    pub hash: String,
    /// Whether a previous manifest existed at all.
    pub had_previous: bool,
}

impl ManifestBuilder {
    pub fn new(paths: TaskStatePaths) -> Result<Self, Error> {
        let previous = read_manifest(paths.manifest())?;
        if let Some(parent) = paths.next().parent() {
            parent.create_dir_all()?;
        }
        if let Some(parent) = paths.diff().parent() {
            parent.create_dir_all()?;
        }
        let writer = BufWriter::new(fs::File::create(paths.next().as_std_path())?);
        Ok(ManifestBuilder {
            paths,
            previous,
            writer,
            aggregate: AggregateHasher::new(),
            entries: Vec::new(),
        })
    }

    /// Appends the next entry in canonical order.
    pub fn update(
        &mut self,
        kind: InputKind,
        id: impl Into<String>,
        hash: impl Into<String>,
        meta: Option<String>,
    ) -> Result<(), Error> {
        let entry = ManifestEntry::new(kind, id, hash, meta)?;
        if let Some(last) = self.entries.last() {
            if last.order_key() >= entry.order_key() {
                return Err(Error::OutOfOrderEntry {
                    previous: format!("{} {}", last.kind.label(), last.id),
                    next: format!("{} {}", entry.kind.label(), entry.id),
                });
            }
        }
        self.writer.write_all(entry.serialize().as_bytes())?;
        self.aggregate.update_line(&entry.hashable_line());
        self.entries.push(entry);
        Ok(())
    }

    /// The fast path: if the previous manifest has `(kind, id)` with exactly
    /// this metadata, its hash is copied forward and the caller can skip
    /// hashing the content. Returns false when the caller must hash and call
    /// [`ManifestBuilder::update`] itself.
    pub fn copy_line_over_if_meta_is_same(
        &mut self,
        kind: InputKind,
        id: &str,
        meta: &str,
    ) -> Result<bool, Error> {
        let Some(previous) = &self.previous else {
            return Ok(false);
        };
        let Some(entry) = previous.lookup(kind, id) else {
            return Ok(false);
        };
        if entry.meta.as_deref() != Some(meta) {
            return Ok(false);
        }
        let hash = entry.hash.clone();
        self.update(kind, id, hash, Some(meta.to_string()))?;
        Ok(true)
    }

    /// Finalizes: flushes the `.next` file, writes the diff against the
    /// previous manifest, and atomically renames `.next` into place.
    pub fn end(mut self) -> Result<ManifestOutcome, Error> {
        self.writer.flush()?;
        drop(self.writer);

        let hash = self.aggregate.finish();
        let had_previous = self.previous.is_some();
        let did_change = self
            .previous
            .as_ref()
            .map_or(true, |previous| previous.aggregate_hash() != hash);

        let previous_entries = self
            .previous
            .as_ref()
            .map_or(&[] as &[ManifestEntry], |previous| previous.entries());
        let diff = diff_lines(previous_entries, &self.entries);
        let mut rendered = diff.join("\n");
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        self.paths.diff().create_with_contents(rendered)?;

        self.paths.next().rename(self.paths.manifest())?;

        Ok(ManifestOutcome {
            did_change,
            hash,
            had_previous,
        })
    }
}

#[cfg(test)]
mod test {
    use lazyrepo_paths::AbsoluteSystemPathBuf;
    use pretty_assertions::assert_eq;

    use super::*;

    fn package_dir(dir: &tempfile::TempDir) -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    fn build_simple(paths: &TaskStatePaths, ci_hash: &str) -> ManifestOutcome {
        let mut builder = ManifestBuilder::new(paths.clone()).unwrap();
        builder
            .update(InputKind::EnvVar, "CI", ci_hash, None)
            .unwrap();
        builder
            .update(InputKind::File, "src/index.js", "filehash", Some("100".into()))
            .unwrap();
        builder.end().unwrap()
    }

    #[test]
    fn test_first_build_changes_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        let outcome = build_simple(&paths, "cihash");
        assert!(outcome.did_change);
        assert!(!outcome.had_previous);
        assert!(paths.manifest().is_file());
        assert!(!paths.next().exists());
        assert_eq!(
            paths.diff().read_to_string().unwrap(),
            "+ added env var CI\n+ added file src/index.js\n"
        );
    }

    #[test]
    fn test_identical_rebuild_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        let first = build_simple(&paths, "cihash");
        let second = build_simple(&paths, "cihash");
        assert!(!second.did_change);
        assert!(second.had_previous);
        assert_eq!(first.hash, second.hash);
        assert_eq!(paths.diff().read_to_string().unwrap(), "");
    }

    #[test]
    fn test_changed_entry_changes_hash_and_diff() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        let first = build_simple(&paths, "cihash");
        let second = build_simple(&paths, "other");
        assert!(second.did_change);
        assert_ne!(first.hash, second.hash);
        assert_eq!(
            paths.diff().read_to_string().unwrap(),
            "± changed env var CI\n"
        );
    }

    #[test]
    fn test_copy_line_over_fast_path() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        build_simple(&paths, "cihash");

        let mut builder = ManifestBuilder::new(paths.clone()).unwrap();
        builder
            .update(InputKind::EnvVar, "CI", "cihash", None)
            .unwrap();
        // same mtime: hash is copied from the previous manifest
        assert!(builder
            .copy_line_over_if_meta_is_same(InputKind::File, "src/index.js", "100")
            .unwrap());
        let outcome = builder.end().unwrap();
        assert!(!outcome.did_change);
    }

    #[test]
    fn test_copy_line_over_misses_on_new_meta() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        build_simple(&paths, "cihash");

        let mut builder = ManifestBuilder::new(paths.clone()).unwrap();
        builder
            .update(InputKind::EnvVar, "CI", "cihash", None)
            .unwrap();
        assert!(!builder
            .copy_line_over_if_meta_is_same(InputKind::File, "src/index.js", "200")
            .unwrap());
        // caller re-hashes; content turned out identical, so no change overall
        builder
            .update(InputKind::File, "src/index.js", "filehash", Some("200".into()))
            .unwrap();
        let outcome = builder.end().unwrap();
        assert!(!outcome.did_change);
    }

    #[test]
    fn test_out_of_order_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        let mut builder = ManifestBuilder::new(paths).unwrap();
        builder
            .update(InputKind::File, "b.txt", "hash", None)
            .unwrap();
        assert!(matches!(
            builder.update(InputKind::File, "a.txt", "hash", None),
            Err(Error::OutOfOrderEntry { .. })
        ));
        // duplicates are out of order too
        assert!(builder.update(InputKind::File, "b.txt", "hash", None).is_err());
        // and so is an earlier-ranked kind after a file entry
        assert!(builder
            .update(InputKind::EnvVar, "CI", "hash", None)
            .is_err());
    }

    #[test]
    fn test_next_file_is_replaced_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TaskStatePaths::new(&package_dir(&dir), "build");
        // a stale .next from an interrupted run is simply overwritten
        paths.next().create_with_contents("stale").unwrap();
        let outcome = build_simple(&paths, "cihash");
        assert!(outcome.did_change);
        assert!(!paths.next().exists());
    }
}
