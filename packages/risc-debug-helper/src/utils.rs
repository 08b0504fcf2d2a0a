use std::env;
use std::path::{Path, PathBuf};

/// Absolute, `.`/`..`-free path with forward slashes. Paths that do not exist
/// on this machine (sources of a cross-compiled image) are made absolute only.
pub fn canonicalize_path(source_path: &str) -> String {
    let path = Path::new(source_path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(path)
    };

    // dunce drops the \\?\ prefix std adds on Windows
    let canonical = dunce::canonicalize(&absolute).unwrap_or(absolute);
    canonical.to_string_lossy().replace('\\', "/")
}

/// Resolve an image path from configuration relative to the directory the configuration lives in.
pub fn resolve_relative(base_dir: Option<&Path>, path: &Path) -> PathBuf {
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
