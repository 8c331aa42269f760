use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `BLUEPRINT_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `blueprint.json`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd)
}

fn find_root(start: &Path) -> PathBuf {
    walk_up(start, |dir| dir.join(blueprint_core::paths::MANIFEST_FILE).is_file())
        .or_else(|| walk_up(start, |dir| dir.join(".git").is_dir()))
        .unwrap_or_else(|| start.to_path_buf())
}

fn walk_up(start: &Path, marker: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| marker(dir)).map(Path::to_path_buf)
}
