use std::{borrow::Borrow, cmp::Ordering, fmt, ops::Deref};

use serde::{Deserialize, Serialize};

use crate::{AnchoredSystemPath, PathError};

/// An owned anchored path. See [`AnchoredSystemPath`].
///
/// Ordering is plain lexicographic ordering of the rendered string, which is
/// the order manifest entries and task keys sort in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchoredSystemPathBuf(String);

impl AnchoredSystemPathBuf {
    pub fn new(value: impl Into<String>) -> Result<Self, PathError> {
        let value = value.into();
        AnchoredSystemPath::new(&value)?;
        Ok(Self(value))
    }

    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    /// The empty path, referring to the anchor itself.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_anchored_path(&self) -> &AnchoredSystemPath {
        AnchoredSystemPath::new_unchecked(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Deref for AnchoredSystemPathBuf {
    type Target = AnchoredSystemPath;

    fn deref(&self) -> &Self::Target {
        self.as_anchored_path()
    }
}

impl Borrow<AnchoredSystemPath> for AnchoredSystemPathBuf {
    fn borrow(&self) -> &AnchoredSystemPath {
        self.as_anchored_path()
    }
}

impl AsRef<AnchoredSystemPath> for AnchoredSystemPathBuf {
    fn as_ref(&self) -> &AnchoredSystemPath {
        self.as_anchored_path()
    }
}

impl PartialOrd for AnchoredSystemPathBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AnchoredSystemPathBuf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_str().cmp(other.0.as_str())
    }
}

impl fmt::Display for AnchoredSystemPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for AnchoredSystemPathBuf {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic_on_string() {
        let mut paths = vec![
            AnchoredSystemPathBuf::new("packages/utils/z.js").unwrap(),
            AnchoredSystemPathBuf::new("packages/utils-extra/a.js").unwrap(),
            AnchoredSystemPathBuf::new("package.json").unwrap(),
        ];
        paths.sort();
        let rendered: Vec<_> = paths.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            rendered,
            vec![
                "package.json",
                "packages/utils-extra/a.js",
                "packages/utils/z.js",
            ]
        );
    }
}
