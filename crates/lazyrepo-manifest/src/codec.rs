use std::{collections::HashMap, io};

use lazyrepo_hash::AggregateHasher;
use lazyrepo_paths::AbsoluteSystemPath;
use tracing::warn;

use crate::{Error, InputKind, ManifestEntry};

/// The previous run's manifest, indexed for the builder's fast path.
#[derive(Debug)]
pub struct PreviousManifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<(InputKind, String), usize>,
    aggregate_hash: String,
}

impl PreviousManifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn aggregate_hash(&self) -> &str {
        &self.aggregate_hash
    }

    pub fn lookup(&self, kind: InputKind, id: &str) -> Option<&ManifestEntry> {
        self.index
            .get(&(kind, id.to_string()))
            .map(|&i| &self.entries[i])
    }

    fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        let mut aggregate = AggregateHasher::new();
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            aggregate.update_line(&entry.hashable_line());
            index.insert((entry.kind, entry.id.clone()), i);
        }
        PreviousManifest {
            entries,
            index,
            aggregate_hash: aggregate.finish(),
        }
    }
}

/// Reads the manifest at `path`, if any.
///
/// Absence is the normal first-run case. A trailing line without a newline
/// terminator is discarded as the remnant of an interrupted write; any other
/// malformed content makes the whole manifest count as absent, which is safe
/// because absence forces a cache miss.
pub fn read_manifest(path: &AbsoluteSystemPath) -> Result<Option<PreviousManifest>, Error> {
    let contents = match path.read_to_string() {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut entries = Vec::new();
    for line in contents.split_inclusive('\n') {
        let Some(line) = line.strip_suffix('\n') else {
            warn!("discarding partial trailing line in manifest {path}");
            break;
        };
        match ManifestEntry::parse(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                warn!("treating unreadable manifest {path} as absent: {err}");
                return Ok(None);
            }
        }
    }
    Ok(Some(PreviousManifest::from_entries(entries)))
}

#[cfg(test)]
mod test {
    use lazyrepo_paths::AbsoluteSystemPathBuf;
    use pretty_assertions::assert_eq;

    use super::*;

    fn write_manifest(dir: &tempfile::TempDir, contents: &str) -> AbsoluteSystemPathBuf {
        let path = dir.path().join("manifest");
        std::fs::write(&path, contents).unwrap();
        AbsoluteSystemPathBuf::try_from(path).unwrap()
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = AbsoluteSystemPathBuf::try_from(dir.path().join("nope")).unwrap();
        assert!(read_manifest(&path).unwrap().is_none());
    }

    #[test]
    fn test_read_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let contents = "env var\tCI\tabc\nfile\tsrc/a.js\tdef\t1700000\n";
        let path = write_manifest(&dir, contents);
        let manifest = read_manifest(&path).unwrap().unwrap();
        let rendered: String = manifest.entries().iter().map(ManifestEntry::serialize).collect();
        assert_eq!(rendered, contents);
        // the aggregate covers the lines minus their metadata column
        assert_eq!(
            manifest.aggregate_hash(),
            lazyrepo_hash::hash_string("env var\tCI\tabc\nfile\tsrc/a.js\tdef\n")
        );
    }

    #[test]
    fn test_partial_trailing_line_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, "env var\tCI\tabc\nfile\tsrc/a.js\tde");
        let manifest = read_manifest(&path).unwrap().unwrap();
        assert_eq!(manifest.entries().len(), 1);
        assert!(manifest.lookup(InputKind::EnvVar, "CI").is_some());
    }

    #[test]
    fn test_garbage_manifest_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(&dir, "not a manifest at all\n");
        assert!(read_manifest(&path).unwrap().is_none());
    }
}
