//! Typed paths for the lazyrepo workspace.
//!
//! Two families of paths flow through the task runner:
//!
//! - [`AbsoluteSystemPath`] / [`AbsoluteSystemPathBuf`]: absolute paths in the
//!   system encoding, used for all filesystem access.
//! - [`AnchoredSystemPath`] / [`AnchoredSystemPathBuf`]: paths relative to the
//!   workspace root (or a package directory), always using `/` separators so
//!   that manifests serialize byte-identically across platforms.
//!
//! All paths are UTF-8. Non-UTF-8 paths are rejected at the boundary rather
//! than carried around as `OsStr`.

mod absolute_system_path;
mod absolute_system_path_buf;
mod anchored_system_path;
mod anchored_system_path_buf;

use std::path::PathBuf;

pub use absolute_system_path::AbsoluteSystemPath;
pub use absolute_system_path_buf::AbsoluteSystemPathBuf;
pub use anchored_system_path::AnchoredSystemPath;
pub use anchored_system_path_buf::AnchoredSystemPathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),
    #[error("path is not relative: {0}")]
    NotRelative(String),
    #[error("{path} is not a child of {root}")]
    NotParent { root: String, path: String },
    #[error("path is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PathError {
    pub(crate) fn invalid_utf8(path: PathBuf) -> Self {
        PathError::InvalidUtf8(path.to_string_lossy().into_owned())
    }
}
