//! The input-manifest format and cache decision machinery.
//!
//! A manifest is the canonical, line-oriented record of one task's
//! fingerprinted inputs. Entries are kept in a strict total order (by input
//! kind rank, then id), the aggregate hash is the hash of the serialized
//! lines, and two manifests are diffable line-by-line. The
//! [`builder::ManifestBuilder`] streams a new manifest to
//! `.lazy/manifests/<slug>.next`, diffs it against the previous run, and
//! atomically renames it into place.

mod builder;
mod codec;
mod diff;
mod entry;
mod layout;

pub use builder::{ManifestBuilder, ManifestOutcome};
pub use codec::{read_manifest, PreviousManifest};
pub use diff::diff_lines;
pub use entry::{InputKind, ManifestEntry};
pub use layout::{slug, TaskStatePaths, LAZY_DIR_NAME};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "manifest entries out of order: '{next}' written after '{previous}'"
    )]
    OutOfOrderEntry { previous: String, next: String },
    #[error("malformed manifest line: {line:?}")]
    MalformedLine { line: String },
    #[error("unknown manifest entry type: {label:?}")]
    UnknownKind { label: String },
    #[error("manifest field contains a reserved character: {value:?}")]
    ReservedCharacter { value: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
