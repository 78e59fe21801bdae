use std::collections::BTreeMap;

use lazyrepo_globwalk::globwalk_files;
use lazyrepo_paths::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};
use tracing::warn;

use crate::{
    package_json::{PackageJson, PACKAGE_JSON},
    package_manager::PackageManager,
    Error,
};

/// One workspace member. Immutable after discovery.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    /// Package directory anchored to the workspace root; empty only for the
    /// synthetic root package.
    pub dir: AnchoredSystemPathBuf,
    pub package_json: PackageJson,
    /// Workspace members this package depends on, sorted by name.
    pub local_deps: Vec<String>,
}

/// All member packages plus the root package, with local dependency edges
/// already restricted to in-workspace names.
#[derive(Debug)]
pub struct PackageGraph {
    root: AbsoluteSystemPathBuf,
    package_manager: PackageManager,
    root_package: PackageInfo,
    packages: BTreeMap<String, PackageInfo>,
}

impl PackageGraph {
    pub fn build(
        root: &AbsoluteSystemPath,
        package_manager: PackageManager,
    ) -> Result<Self, Error> {
        let root_package_json_path = root.join_component(PACKAGE_JSON);
        let root_package_json = if root_package_json_path.is_file() {
            PackageJson::load(&root_package_json_path)?
        } else {
            PackageJson::default()
        };

        let globs = package_manager.workspace_globs(root, &root_package_json)?;
        let manifest_globs: Vec<String> = globs
            .iter()
            .map(|glob| format!("{}/{PACKAGE_JSON}", glob.trim_end_matches('/')))
            .collect();

        let mut discovered: Vec<(AnchoredSystemPathBuf, PackageJson)> = Vec::new();
        for manifest in globwalk_files(root, &manifest_globs, &[])? {
            let absolute = root.resolve(&manifest);
            let package_json = PackageJson::load(&absolute)?;
            let dir = root.anchor(
                absolute
                    .parent()
                    .expect("package.json paths have a parent"),
            )?;
            discovered.push((dir, package_json));
        }

        let mut packages: BTreeMap<String, PackageInfo> = BTreeMap::new();
        for (dir, package_json) in discovered {
            let Some(name) = package_json.name.clone() else {
                warn!("ignoring unnamed package at {dir}");
                continue;
            };
            if let Some(existing) = packages.get(&name) {
                return Err(Error::DuplicatePackageName {
                    name,
                    first: existing.dir.to_string(),
                    second: dir.to_string(),
                });
            }
            packages.insert(
                name.clone(),
                PackageInfo {
                    name,
                    dir,
                    package_json,
                    local_deps: Vec::new(),
                },
            );
        }

        // second pass now that the member set is known
        let member_names: Vec<String> = packages.keys().cloned().collect();
        for package in packages.values_mut() {
            package.local_deps = package
                .package_json
                .all_dependency_names()
                .filter(|name| member_names.iter().any(|member| member == name))
                .map(str::to_string)
                .collect();
        }

        let root_package = PackageInfo {
            name: root_package_json
                .name
                .clone()
                .unwrap_or_else(|| "//".to_string()),
            dir: AnchoredSystemPathBuf::root(),
            package_json: root_package_json,
            local_deps: Vec::new(),
        };

        Ok(PackageGraph {
            root: root.to_owned(),
            package_manager,
            root_package,
            packages,
        })
    }

    pub fn root(&self) -> &AbsoluteSystemPath {
        &self.root
    }

    pub fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    /// The synthetic package for the workspace root itself, used by
    /// top-level tasks.
    pub fn root_package(&self) -> &PackageInfo {
        &self.root_package
    }

    /// Member packages in name order. Does not include the root package.
    pub fn packages(&self) -> impl Iterator<Item = &PackageInfo> {
        self.packages.values()
    }

    pub fn package(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
