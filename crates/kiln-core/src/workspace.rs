use std::path::{Path, PathBuf};

/// Files whose presence marks the root of a Bazel workspace. Bzlmod markers come first.
pub const WORKSPACE_MARKERS: [&str; 4] =
    ["MODULE.bazel", "REPO.bazel", "WORKSPACE.bazel", "WORKSPACE"];

pub fn is_bazel_workspace(dir: &Path) -> bool {
    WORKSPACE_MARKERS.iter().any(|name| dir.join(name).is_file())
}

/// Closest directory at or above `path` that holds a workspace marker.
///
/// `path` may name a file inside the workspace; the search then starts at its parent.
pub fn bazel_workspace_root(path: impl AsRef<Path>) -> Option<PathBuf> {
    let path = path.as_ref();
    let first = if path.is_file() { path.parent()? } else { path };
    first
        .ancestors()
        .find(|dir| is_bazel_workspace(dir))
        .map(Path::to_path_buf)
}
