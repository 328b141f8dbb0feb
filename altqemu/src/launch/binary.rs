//! Virtualization binary lookup.

use crate::errors::{SupervisorError, SupervisorResult};
use std::path::{Path, PathBuf};

/// Find `bin` on `PATH` (or use it directly when it contains a `/`) and
/// follow its symlink chain to the real executable.
pub fn resolve_binary(bin: &str) -> SupervisorResult<PathBuf> {
    let not_found = |reason: String| SupervisorError::BinaryNotFound {
        binary: bin.to_string(),
        reason,
    };

    let found = if bin.contains('/') {
        let candidate = PathBuf::from(bin);
        if !is_executable(&candidate) {
            return Err(not_found("not an executable file".into()));
        }
        candidate
    } else {
        let search = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&search)
            .map(|dir| dir.join(bin))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| not_found("executable file not found in $PATH".into()))?
    };

    let resolved = found
        .canonicalize()
        .map_err(|e| not_found(format!("failed to follow {}: {}", found.display(), e)))?;

    tracing::debug!(binary = %bin, resolved = %resolved.display(), "Resolved binary");
    Ok(resolved)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
