//! Executable and PATH handling for stdio MCP servers.
//!
//! - Validate explicit executable paths (exists, is a file, executable bit)
//! - Validate working directories
//! - Build the PATH handed to the child process

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default paths to include on macOS when PATH is limited (bundled apps)
#[cfg(target_os = "macos")]
const MACOS_DEFAULT_PATHS: &[&str] = &[
    "/opt/homebrew/bin",
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
];

/// Whether `command` names a path rather than something to look up on PATH.
pub fn is_explicit_path(command: &str) -> bool {
    Path::new(command).components().count() > 1 || Path::new(command).is_absolute()
}

/// Validate an explicit executable path.
///
/// Bare command names (`npx`, `uvx`) are left to PATH lookup at spawn time.
pub fn validate_exe_path(exe_path: &str) -> Result<(), String> {
    let path = Path::new(exe_path);

    if !path.exists() {
        return Err(format!("Executable not found: {exe_path}"));
    }

    if !path.is_file() {
        return Err(format!("Executable path is not a file: {exe_path}"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(metadata) => {
                if metadata.permissions().mode() & 0o111 == 0 {
                    return Err(format!("File is not executable: {exe_path}"));
                }
            }
            Err(e) => return Err(format!("Failed to check permissions: {e}")),
        }
    }

    Ok(())
}

/// Validate a working directory.
pub fn validate_working_dir(cwd: &str) -> Result<(), String> {
    let path = Path::new(cwd);

    if !path.exists() {
        return Err(format!("Working directory does not exist: {cwd}"));
    }

    if !path.is_dir() {
        return Err(format!("Working directory path is not a directory: {cwd}"));
    }

    Ok(())
}

/// Build the PATH for a child process.
///
/// Order, deduplicated:
/// 1. User-provided `path_extra` (so shims win)
/// 2. Directory containing an explicit executable path
/// 3. Current process PATH
/// 4. Platform defaults (macOS bundled apps start with a minimal PATH)
pub fn build_effective_path(command: &str, path_extra: Option<&str>) -> OsString {
    let mut entries: Vec<PathBuf> = Vec::new();

    if let Some(extra) = path_extra {
        entries.extend(env::split_paths(extra));
    }

    if is_explicit_path(command) {
        if let Some(dir) = Path::new(command).parent() {
            entries.push(dir.to_path_buf());
        }
    }

    if let Some(current) = env::var_os("PATH") {
        entries.extend(env::split_paths(&current));
    }

    #[cfg(target_os = "macos")]
    entries.extend(MACOS_DEFAULT_PATHS.iter().map(PathBuf::from));

    let mut seen = std::collections::HashSet::new();
    let deduped: Vec<PathBuf> = entries
        .into_iter()
        .filter(|entry| !entry.as_os_str().is_empty())
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    // join_paths only fails on entries containing the separator, which
    // split_paths never yields
    env::join_paths(deduped).unwrap_or_default()
}
