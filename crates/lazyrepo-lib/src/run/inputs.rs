use std::collections::BTreeSet;

use lazyrepo_globwalk::globwalk_files;
use lazyrepo_paths::{AbsoluteSystemPath, AnchoredSystemPathBuf};

use crate::task_config::{BaseCacheConfig, CacheConfig, ROOT_DIR_TOKEN};

/// Enumerates one task's input files: base-cache includes, then the task's
/// package-scoped globs, then extra files handed down from upstream outputs.
/// Returns repo-anchored paths, deduplicated and sorted.
///
/// Callers handle `cache: "none"` before getting here; an un-cacheable task
/// has no input set at all, not an empty one.
pub fn enumerate_inputs(
    root: &AbsoluteSystemPath,
    package_dir: &AbsoluteSystemPath,
    base: &BaseCacheConfig,
    cache: &CacheConfig,
    extra_files: &[AnchoredSystemPathBuf],
) -> Result<Vec<AnchoredSystemPathBuf>, lazyrepo_globwalk::WalkError> {
    let mut files: BTreeSet<AnchoredSystemPathBuf> = BTreeSet::new();

    let base_includes = expand_root_token(&base.includes);
    let base_excludes = expand_root_token(&base.excludes);
    files.extend(globwalk_files(root, &base_includes, &base_excludes)?);

    for file in globwalk_files(package_dir, &cache.inputs.include, &cache.inputs.exclude)? {
        files.insert(root.anchor(&package_dir.resolve(&file))?);
    }

    files.extend(extra_files.iter().cloned());

    Ok(files.into_iter().collect())
}

/// Base-cache globs address the workspace root through the `<rootDir>`
/// token; the walk is rooted there, so the token just drops away.
fn expand_root_token(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|pattern| {
            pattern
                .strip_prefix(&format!("{ROOT_DIR_TOKEN}/"))
                .unwrap_or(pattern)
                .to_string()
        })
        .collect()
}
