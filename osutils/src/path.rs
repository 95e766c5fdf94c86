use std::path::{Path, PathBuf};

fn strip_root(path: &Path) -> &Path {
    match path.strip_prefix("/") {
        Ok(relative) => relative,
        Err(_) => path,
    }
}

/// Returns the path obtained by joining the given base path with the given relative path.
pub fn join_relative(base: impl AsRef<Path>, relative: impl AsRef<Path>) -> PathBuf {
    base.as_ref().join(strip_root(relative.as_ref()))
}

/// Resolves `path` under `root` when one is configured, otherwise returns it unchanged.
pub fn root_relative(root: Option<impl AsRef<Path>>, path: impl AsRef<Path>) -> PathBuf {
    match root {
        Some(root) => join_relative(root, path),
        None => path.as_ref().to_path_buf(),
    }
}
