use lazyrepo_paths::AbsoluteSystemPath;

use crate::{package_manager::PackageManager, Error};

/// Where we are: the workspace root and the package manager that owns it.
#[derive(Debug, Clone)]
pub struct RepoState {
    pub root: lazyrepo_paths::AbsoluteSystemPathBuf,
    pub package_manager: PackageManager,
}

impl RepoState {
    /// Finds the nearest ancestor of `cwd` holding a package-manager
    /// lockfile. No lockfile anywhere up the tree is fatal: without one we
    /// can neither name the package manager nor trust a root.
    pub fn infer(cwd: &AbsoluteSystemPath) -> Result<Self, Error> {
        for candidate in cwd.ancestors() {
            if let Some(package_manager) = PackageManager::detect(candidate) {
                return Ok(RepoState {
                    root: candidate.to_owned(),
                    package_manager,
                });
            }
        }
        Err(Error::MissingRoot {
            cwd: cwd.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use lazyrepo_paths::AbsoluteSystemPathBuf;

    use super::*;

    #[test]
    fn test_infer_from_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pnpm-lock.yaml"), b"").unwrap();
        std::fs::create_dir_all(dir.path().join("packages/utils/src")).unwrap();
        let nested =
            AbsoluteSystemPathBuf::try_from(dir.path().join("packages/utils/src")).unwrap();
        let state = RepoState::infer(&nested).unwrap();
        assert_eq!(
            state.root,
            AbsoluteSystemPathBuf::try_from(dir.path().to_path_buf()).unwrap()
        );
        assert_eq!(state.package_manager, PackageManager::Pnpm);
    }

    #[test]
    fn test_infer_fails_without_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = AbsoluteSystemPathBuf::try_from(dir.path().to_path_buf()).unwrap();
        assert!(matches!(
            RepoState::infer(&cwd),
            Err(Error::MissingRoot { .. })
        ));
    }
}
