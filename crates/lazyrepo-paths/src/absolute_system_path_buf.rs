use std::{borrow::Borrow, fmt, ops::Deref, path::PathBuf};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::{AbsoluteSystemPath, PathError};

/// An owned absolute path using the system's separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AbsoluteSystemPathBuf(Utf8PathBuf);

impl AbsoluteSystemPathBuf {
    pub fn new(value: impl Into<Utf8PathBuf>) -> Result<Self, PathError> {
        let path = value.into();
        if !path.is_absolute() {
            return Err(PathError::NotAbsolute(path.into_string()));
        }
        Ok(Self(path))
    }

    pub(crate) fn new_unchecked(path: Utf8PathBuf) -> Self {
        Self(path)
    }

    /// The current working directory.
    pub fn cwd() -> Result<Self, PathError> {
        let cwd = std::env::current_dir()?;
        Self::try_from(cwd)
    }

    pub fn as_absolute_path(&self) -> &AbsoluteSystemPath {
        AbsoluteSystemPath::new_unchecked(self.0.as_path())
    }

    pub fn into_string(self) -> String {
        self.0.into_string()
    }
}

impl TryFrom<PathBuf> for AbsoluteSystemPathBuf {
    type Error = PathError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        let utf8 =
            Utf8PathBuf::from_path_buf(path).map_err(PathError::invalid_utf8)?;
        Self::new(utf8)
    }
}

impl Deref for AbsoluteSystemPathBuf {
    type Target = AbsoluteSystemPath;

    fn deref(&self) -> &Self::Target {
        self.as_absolute_path()
    }
}

impl Borrow<AbsoluteSystemPath> for AbsoluteSystemPathBuf {
    fn borrow(&self) -> &AbsoluteSystemPath {
        self.as_absolute_path()
    }
}

impl AsRef<AbsoluteSystemPath> for AbsoluteSystemPathBuf {
    fn as_ref(&self) -> &AbsoluteSystemPath {
        self.as_absolute_path()
    }
}

impl fmt::Display for AbsoluteSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
