use std::fmt;

use crate::Error;

/// The kind of input a manifest entry fingerprints.
///
/// Declaration order is rank order: entries sort by `(kind, id)`, with the
/// two upstream kinds at adjacent ranks (`task` before `package`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InputKind {
    UpstreamTaskInputs,
    UpstreamPackageInputs,
    EnvVar,
    File,
}

impl InputKind {
    pub fn label(&self) -> &'static str {
        match self {
            InputKind::UpstreamTaskInputs => "upstream task inputs",
            InputKind::UpstreamPackageInputs => "upstream package inputs",
            InputKind::EnvVar => "env var",
            InputKind::File => "file",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "upstream task inputs" => Some(InputKind::UpstreamTaskInputs),
            "upstream package inputs" => Some(InputKind::UpstreamPackageInputs),
            "env var" => Some(InputKind::EnvVar),
            "file" => Some(InputKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One fingerprinted input: `(kind, id, hash[, meta])`.
///
/// `id` is a task key for the upstream kinds, an env-var name, or a
/// repo-anchored file path. `meta` is an opaque string the builder may use to
/// skip re-hashing (for files, the mtime in milliseconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: InputKind,
    pub id: String,
    pub hash: String,
    pub meta: Option<String>,
}

impl ManifestEntry {
    pub fn new(
        kind: InputKind,
        id: impl Into<String>,
        hash: impl Into<String>,
        meta: Option<String>,
    ) -> Result<Self, Error> {
        let entry = ManifestEntry {
            kind,
            id: id.into(),
            hash: hash.into(),
            meta,
        };
        for field in [Some(entry.id.as_str()), Some(entry.hash.as_str()), entry.meta.as_deref()]
            .into_iter()
            .flatten()
        {
            if field.contains('\t') || field.contains('\n') {
                return Err(Error::ReservedCharacter {
                    value: field.to_string(),
                });
            }
        }
        Ok(entry)
    }

    /// The canonical sort key.
    pub fn order_key(&self) -> (InputKind, &str) {
        (self.kind, &self.id)
    }

    /// Renders the entry as one manifest line, including the trailing
    /// newline.
    pub fn serialize(&self) -> String {
        match &self.meta {
            Some(meta) => format!("{}\t{}\t{}\t{}\n", self.kind.label(), self.id, self.hash, meta),
            None => format!("{}\t{}\t{}\n", self.kind.label(), self.id, self.hash),
        }
    }

    /// The line as fed to the aggregate hash. Metadata is excluded: it only
    /// exists to let the builder skip re-hashing, so a file whose mtime moved
    /// while its contents stayed put must not change the manifest hash.
    pub fn hashable_line(&self) -> String {
        format!("{}\t{}\t{}\n", self.kind.label(), self.id, self.hash)
    }

    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut fields = line.split('\t');
        let (Some(label), Some(id), Some(hash)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::MalformedLine {
                line: line.to_string(),
            });
        };
        let meta = fields.next().map(str::to_string);
        if fields.next().is_some() {
            return Err(Error::MalformedLine {
                line: line.to_string(),
            });
        }
        let kind = InputKind::from_label(label).ok_or_else(|| Error::UnknownKind {
            label: label.to_string(),
        })?;
        Ok(ManifestEntry {
            kind,
            id: id.to_string(),
            hash: hash.to_string(),
            meta,
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_kind_ranks() {
        assert!(InputKind::UpstreamTaskInputs < InputKind::UpstreamPackageInputs);
        assert!(InputKind::UpstreamPackageInputs < InputKind::EnvVar);
        assert!(InputKind::EnvVar < InputKind::File);
    }

    #[test_case("file\tsrc/index.js\tabc123\t170000000" ; "with meta")]
    #[test_case("env var\tCI\tabc123" ; "without meta")]
    #[test_case("upstream task inputs\tbuild::<rootDir>\tffff" ; "upstream")]
    fn test_parse_serialize_round_trip(line: &str) {
        let entry = ManifestEntry::parse(line).unwrap();
        assert_eq!(entry.serialize(), format!("{line}\n"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ManifestEntry::parse("just one field").is_err());
        assert!(ManifestEntry::parse("bogus kind\tid\thash").is_err());
        assert!(ManifestEntry::parse("file\ta\tb\tc\td").is_err());
    }

    #[test]
    fn test_new_rejects_reserved_characters() {
        assert!(ManifestEntry::new(InputKind::File, "a\tb", "hash", None).is_err());
        assert!(ManifestEntry::new(InputKind::File, "a", "ha\nsh", None).is_err());
    }
}
