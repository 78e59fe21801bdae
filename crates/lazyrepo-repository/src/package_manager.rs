use std::fmt;

use lazyrepo_paths::AbsoluteSystemPath;
use serde::Deserialize;

use crate::{package_json::PackageJson, Error};

pub const PNPM_WORKSPACE: &str = "pnpm-workspace.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

#[derive(Debug, Deserialize)]
struct PnpmWorkspace {
    packages: Vec<String>,
}

impl PackageManager {
    pub const ALL: &'static [PackageManager] =
        &[PackageManager::Pnpm, PackageManager::Yarn, PackageManager::Npm];

    pub const fn lockfile(&self) -> &'static str {
        match self {
            PackageManager::Npm => "package-lock.json",
            PackageManager::Pnpm => "pnpm-lock.yaml",
            PackageManager::Yarn => "yarn.lock",
        }
    }

    pub const fn command(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }

    /// Which package manager owns `dir`, judged by lockfile presence.
    pub fn detect(dir: &AbsoluteSystemPath) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|pm| dir.join_component(pm.lockfile()).is_file())
    }

    /// The workspace globs declared for this root, or empty for a
    /// single-package repository. pnpm keeps them in `pnpm-workspace.yaml`;
    /// npm and yarn use the root `package.json` `workspaces` field.
    pub fn workspace_globs(
        &self,
        root: &AbsoluteSystemPath,
        root_package_json: &PackageJson,
    ) -> Result<Vec<String>, Error> {
        match self {
            PackageManager::Pnpm => {
                let path = root.join_component(PNPM_WORKSPACE);
                if !path.is_file() {
                    return Ok(Vec::new());
                }
                let contents = path.read_to_string().map_err(|err| Error::Io {
                    path: path.to_string(),
                    err,
                })?;
                let workspace: PnpmWorkspace =
                    serde_yaml::from_str(&contents).map_err(|err| Error::Yaml {
                        path: path.to_string(),
                        err,
                    })?;
                Ok(workspace.packages)
            }
            PackageManager::Npm | PackageManager::Yarn => Ok(root_package_json
                .workspaces
                .as_ref()
                .map(|workspaces| workspaces.as_ref().to_vec())
                .unwrap_or_default()),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}
