//! Image path containment.

use crate::errors::{SupervisorError, SupervisorResult};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Resolve `image_path` and check it lies under `alloc_dir` or one of `roots`.
///
/// Relative image paths are joined onto `alloc_dir`. Both the image and the
/// candidate parents are resolved through symlinks before comparing, so a
/// link inside the allocation directory cannot point the VM at an arbitrary
/// host file. Returns the resolved image path.
pub fn resolve_allowed_image(
    image_path: &str,
    alloc_dir: &Path,
    roots: &[PathBuf],
) -> SupervisorResult<PathBuf> {
    if image_path.trim().is_empty() {
        return Err(SupervisorError::PathNotAllowed {
            path: image_path.to_string(),
            reason: "image_path must be set".into(),
        });
    }

    let joined = alloc_dir.join(image_path);
    let resolved = resolve_symlinks(&normalize(&joined));

    let allowed = std::iter::once(alloc_dir)
        .chain(roots.iter().map(PathBuf::as_path))
        .map(|parent| resolve_symlinks(&normalize(parent)))
        .any(|parent| resolved.starts_with(&parent));

    if !allowed {
        return Err(SupervisorError::PathNotAllowed {
            path: image_path.to_string(),
            reason: format!(
                "{} is outside the allocation directory and image_paths",
                resolved.display()
            ),
        });
    }

    tracing::trace!(
        image_path = %image_path,
        resolved = %resolved.display(),
        "Image path allowed"
    );
    Ok(resolved)
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
fn resolve_symlinks(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, name| acc.join(name));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_image_inside_alloc_dir() {
        let alloc = TempDir::new().unwrap();
        std::fs::write(alloc.path().join("disk.qcow2"), b"").unwrap();

        let resolved = resolve_allowed_image("disk.qcow2", alloc.path(), &[]).unwrap();
        assert_eq!(
            resolved,
            alloc.path().canonicalize().unwrap().join("disk.qcow2")
        );
    }

    #[test]
    fn test_missing_image_inside_alloc_dir_passes_containment() {
        let alloc = TempDir::new().unwrap();
        assert!(resolve_allowed_image("images/later.qcow2", alloc.path(), &[]).is_ok());
    }

    #[test]
    fn test_image_under_allow_listed_root() {
        let alloc = TempDir::new().unwrap();
        let images = TempDir::new().unwrap();
        let image = images.path().join("base.qcow2");

        let path = image.to_str().unwrap();
        assert!(resolve_allowed_image(path, alloc.path(), &[]).is_err());
        assert!(resolve_allowed_image(path, alloc.path(), &[images.path().to_path_buf()]).is_ok());
    }

    #[test]
    fn test_escape_with_dot_dot_rejected() {
        let alloc = TempDir::new().unwrap();
        let err = resolve_allowed_image("../../etc/passwd", alloc.path(), &[]).unwrap_err();
        assert!(matches!(err, SupervisorError::PathNotAllowed { .. }));
    }

    #[test]
    fn test_absolute_path_outside_rejected() {
        let alloc = TempDir::new().unwrap();
        let roots = vec![PathBuf::from("/srv/images")];
        assert!(resolve_allowed_image("/etc/shadow", alloc.path(), &roots).is_err());
        // A sibling sharing the root's name prefix is not a descendant
        assert!(resolve_allowed_image("/srv/images-evil/a.qcow2", alloc.path(), &roots).is_err());
    }

    #[test]
    fn test_unset_image_rejected() {
        let alloc = TempDir::new().unwrap();
        let err = resolve_allowed_image("", alloc.path(), &[]).unwrap_err();
        assert!(err.to_string().contains("image_path must be set"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_alloc_dir_rejected() {
        let alloc = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.qcow2"), b"").unwrap();
        std::os::unix::fs::symlink(outside.path(), alloc.path().join("link")).unwrap();

        let err = resolve_allowed_image("link/secret.qcow2", alloc.path(), &[]).unwrap_err();
        assert!(matches!(err, SupervisorError::PathNotAllowed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_alloc_dir_still_contains_its_images() {
        let real = TempDir::new().unwrap();
        let links = TempDir::new().unwrap();
        let alloc = links.path().join("alloc");
        std::os::unix::fs::symlink(real.path(), &alloc).unwrap();
        std::fs::write(real.path().join("disk.qcow2"), b"").unwrap();

        assert!(resolve_allowed_image("disk.qcow2", &alloc, &[]).is_ok());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }
}
