use std::collections::BTreeMap;

use lazyrepo_paths::AbsoluteSystemPath;
use serde::Deserialize;

use crate::Error;

pub const PACKAGE_JSON: &str = "package.json";

/// The slice of `package.json` the runner cares about: the package name, its
/// scripts, its dependency tables, and (at the root) the workspace globs.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    pub workspaces: Option<Workspaces>,
}

/// The `workspaces` field comes in two shapes in the wild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Workspaces {
    TopLevel(Vec<String>),
    Nested { packages: Vec<String> },
}

impl AsRef<[String]> for Workspaces {
    fn as_ref(&self) -> &[String] {
        match self {
            Workspaces::TopLevel(packages) => packages,
            Workspaces::Nested { packages } => packages,
        }
    }
}

impl PackageJson {
    pub fn load(path: &AbsoluteSystemPath) -> Result<Self, Error> {
        let contents = path.read_to_string().map_err(|err| Error::Io {
            path: path.to_string(),
            err,
        })?;
        serde_json::from_str(&contents).map_err(|err| Error::Json {
            path: path.to_string(),
            err,
        })
    }

    /// Names from every dependency table, deduplicated.
    pub fn all_dependency_names(&self) -> impl Iterator<Item = &str> {
        let mut seen = std::collections::BTreeSet::new();
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .chain(self.optional_dependencies.keys())
            .chain(self.peer_dependencies.keys())
            .filter_map(move |name| seen.insert(name.as_str()).then_some(name.as_str()))
    }

    /// The script body for `name`, treating an empty string as absent.
    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts
            .get(name)
            .map(String::as_str)
            .filter(|script| !script.is_empty())
    }
}
