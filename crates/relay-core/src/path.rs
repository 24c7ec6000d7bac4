//! Translation between wire paths and local paths.
//!
//! Wire paths are relative to the workspace root and use `/` as the
//! separator. On receipt both `/` and `\` are accepted so that peers on
//! other platforms interoperate.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// A wire path that cannot be placed under a workspace root.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid path: {0:?}")]
pub struct InvalidPath(pub String);

/// Split a wire path into validated components.
///
/// Rejects empty paths, absolute paths, NUL bytes and any `..` component.
/// On Windows a `:` is also rejected, since it would name a drive or an
/// alternate data stream. Empty and `.` components are dropped.
pub fn components(wire: &str) -> Result<Vec<&str>, InvalidPath> {
    if wire.starts_with('/') || wire.starts_with('\\') {
        return Err(InvalidPath(wire.to_string()));
    }

    let mut parts = Vec::new();
    for part in wire.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(InvalidPath(wire.to_string())),
            p if p.contains('\0') || (cfg!(windows) && p.contains(':')) => {
                return Err(InvalidPath(wire.to_string()));
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(InvalidPath(wire.to_string()));
    }
    Ok(parts)
}

/// Canonical `/`-separated form of a wire path.
pub fn normalize(wire: &str) -> Result<String, InvalidPath> {
    Ok(components(wire)?.join("/"))
}

/// Resolve a wire path against a local root.
pub fn to_local(root: &Path, wire: &str) -> Result<PathBuf, InvalidPath> {
    let mut local = root.to_path_buf();
    for part in components(wire)? {
        local.push(part);
    }
    Ok(local)
}

/// Express a local path as a wire path relative to `root`.
///
/// Returns `None` for the root itself, for paths outside the root and for
/// paths that are not valid UTF-8.
pub fn to_wire(root: &Path, local: &Path) -> Option<String> {
    let relative = local.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => continue,
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
