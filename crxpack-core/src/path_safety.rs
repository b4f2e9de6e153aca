use crate::error::{PackError, Result};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default)]
pub struct PathPolicy {
    pub follow_symlinks: bool,
}

fn unsafe_path(path: &str, reason: &str) -> PackError {
    PackError::UnsafePath { path: path.to_string(), reason: reason.to_string() }
}

/// Check an archive entry name: non-empty, relative, `/`-separated, and free
/// of `.`/`..`/empty components.
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(unsafe_path(name, "empty name"));
    }
    if name.starts_with('/') {
        return Err(unsafe_path(name, "leading slash"));
    }
    if name.contains('\\') {
        return Err(unsafe_path(name, "backslash separator"));
    }
    if name.contains('\0') {
        return Err(unsafe_path(name, "NUL byte"));
    }
    for comp in name.split('/') {
        match comp {
            "" => return Err(unsafe_path(name, "empty path component")),
            "." | ".." => return Err(unsafe_path(name, "relative path component")),
            _ => {}
        }
    }
    Ok(())
}

/// Resolve entry `name` under `root`. Without `follow_symlinks`, any symlink
/// on the way is rejected; with it, the canonical target must stay under root.
pub fn validate_path(root: &Path, name: &str, policy: PathPolicy) -> Result<PathBuf> {
    validate_entry_name(name)?;
    let candidate = root.join(name);
    if !policy.follow_symlinks {
        // Also check every ancestor component below root
        let mut cur = root.to_path_buf();
        for comp in name.split('/') {
            cur.push(comp);
            if let Ok(m) = std::fs::symlink_metadata(&cur) {
                if m.file_type().is_symlink() {
                    return Err(unsafe_path(name, "symlink encountered (not following)"));
                }
            }
        }
        Ok(candidate)
    } else {
        let root_can = std::fs::canonicalize(root)
            .map_err(|e| PackError::io(crate::error::Stage::Read, root, e))?;
        match std::fs::canonicalize(&candidate) {
            Ok(cand_can) if !cand_can.starts_with(&root_can) => {
                Err(unsafe_path(name, "path escapes source directory"))
            }
            Ok(cand_can) => Ok(cand_can),
            // Nonexistent: nothing to follow, let the caller report it missing
            Err(_) => Ok(candidate),
        }
    }
}
