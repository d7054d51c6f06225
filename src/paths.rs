//! Resolution of user-supplied paths.
//!
//! When the binary is started by a launcher that changes directory first,
//! the launcher exports the user's shell directory as `MLHUB_CWD`. Relative
//! paths are resolved against it so they mean what the user typed.

use std::path::{Component, Path, PathBuf};

/// Environment variable naming the invoking shell's working directory.
pub const LAUNCH_CWD_ENV: &str = "MLHUB_CWD";

/// The directory relative paths are resolved against: `$MLHUB_CWD` when
/// set and non-empty, otherwise the process working directory.
pub fn launch_dir() -> PathBuf {
    match std::env::var_os(LAUNCH_CWD_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Make `path` absolute against [`launch_dir`]. Absolute paths are returned
/// unchanged.
pub fn normalize_path(path: &Path) -> PathBuf {
    resolve_against(path, &launch_dir())
}

/// Join a relative `path` onto `base` and fold `.` and `..` lexically.
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let mut out = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
