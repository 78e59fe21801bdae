pub mod clean;
pub mod run;

use camino::Utf8Path;
use lazyrepo_paths::AbsoluteSystemPathBuf;
use lazyrepo_repository::RepoState;

use crate::cli::Error;

/// Resolves the invocation directory (`--cwd` or the process cwd) and infers
/// the workspace from it.
pub fn repo_state(cwd: Option<&Utf8Path>) -> Result<(AbsoluteSystemPathBuf, RepoState), Error> {
    let invocation_dir = match cwd {
        Some(dir) if dir.is_absolute() => AbsoluteSystemPathBuf::new(dir.to_path_buf())?,
        Some(dir) => {
            let base = AbsoluteSystemPathBuf::cwd()?;
            let components: Vec<&str> = dir.components().map(|c| c.as_str()).collect();
            base.join_components(&components)
        }
        None => AbsoluteSystemPathBuf::cwd()?,
    };
    let repo = RepoState::infer(&invocation_dir)?;
    Ok((invocation_dir, repo))
}
