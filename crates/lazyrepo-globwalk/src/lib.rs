//! Include/exclude glob walking for input enumeration.
//!
//! Walks a base directory and returns the files whose base-relative unix
//! paths match any include glob and no exclude glob. Two classes of entries
//! are never visited, mirroring the glob semantics the config format was
//! written against:
//!
//! - `node_modules` directories (installed dependencies are fingerprinted
//!   through the lockfile, not by content), and
//! - hidden entries, i.e. any name starting with `.` (which also covers the
//!   `.lazy` state directory and `.git`). Wildcards never match dotfiles, so
//!   a task writing `.out.txt` into its own package does not invalidate its
//!   own cache on the next run.

use std::path::Path;

use itertools::Itertools;
use lazyrepo_paths::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf, PathError};
use walkdir::WalkDir;
use wax::{Any, Glob, Pattern};

/// Directory names skipped in every walk even when not hidden.
pub const PRUNED_DIRS: &[&str] = &["node_modules"];

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("bad glob pattern {0}: {1}")]
    BadPattern(String, Box<wax::BuildError>),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// A compiled include/exclude matcher over base-relative unix paths.
pub struct GlobSet {
    includes: Any<'static>,
    excludes: Any<'static>,
    has_includes: bool,
}

impl GlobSet {
    pub fn new(
        include: impl IntoIterator<Item = impl AsRef<str>>,
        exclude: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, WalkError> {
        let include: Vec<_> = include.into_iter().collect();
        let has_includes = !include.is_empty();
        Ok(GlobSet {
            includes: compile_any(include)?,
            excludes: compile_any(exclude)?,
            has_includes,
        })
    }

    /// Matches a base-relative unix path.
    pub fn is_match(&self, path: &str) -> bool {
        self.has_includes
            && self.includes.is_match(Path::new(path))
            && !self.excludes.is_match(Path::new(path))
    }
}

fn compile_any(
    patterns: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<Any<'static>, WalkError> {
    let (globs, raw): (Vec<_>, Vec<_>) = patterns
        .into_iter()
        .map(|raw| {
            let raw = raw.as_ref().to_string();
            Glob::new(&raw)
                .map(|glob| (glob.into_owned(), raw.clone()))
                .map_err(|err| WalkError::BadPattern(raw, Box::new(err)))
        })
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .unzip();
    wax::any(globs).map_err(|err| WalkError::BadPattern(raw.iter().join(","), Box::new(err)))
}

/// Returns the files under `base` matching `include` minus `exclude`,
/// anchored to `base`, in sorted order.
pub fn globwalk_files(
    base: &AbsoluteSystemPath,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<AnchoredSystemPathBuf>, WalkError> {
    if include.is_empty() {
        return Ok(Vec::new());
    }
    let matcher = GlobSet::new(include, exclude)?;
    let mut results = Vec::new();
    let walk = WalkDir::new(base.as_std_path())
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let Some(name) = entry.file_name().to_str() else {
                return false;
            };
            !name.starts_with('.')
                && !(entry.file_type().is_dir() && PRUNED_DIRS.contains(&name))
        });
    for entry in walk {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = AbsoluteSystemPath::from_std_path(entry.path())?;
        let anchored = base.anchor(path)?;
        if matcher.is_match(anchored.as_str()) {
            results.push(anchored);
        }
    }
    results.sort();
    Ok(results)
}

/// As [`globwalk_files`], but returns absolute paths.
pub fn globwalk_files_absolute(
    base: &AbsoluteSystemPath,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<AbsoluteSystemPathBuf>, WalkError> {
    Ok(globwalk_files(base, include, exclude)?
        .into_iter()
        .map(|anchored| base.resolve(&anchored))
        .collect())
}
