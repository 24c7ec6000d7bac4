//! Walking a tree into the minimal list of entries that recreates it.

use crate::fs::{FileSystem, Result};

/// One entry of a tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Wire path relative to the root
    pub path: String,
    pub is_dir: bool,
}

/// Walk the tree under `fs`.
///
/// Yields every file first, then every directory that has no children.
/// Directories with content are implied by the paths below them. File
/// contents are not read here, so callers can stream them one at a time.
pub async fn snapshot<F: FileSystem + ?Sized>(fs: &F) -> Result<Vec<SnapshotEntry>> {
    let mut files = Vec::new();
    let mut empty_dirs = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(dir) = pending.pop() {
        let entries = fs.list(&dir).await?;
        if entries.is_empty() && !dir.is_empty() {
            empty_dirs.push(SnapshotEntry {
                path: dir,
                is_dir: true,
            });
            continue;
        }

        for entry in entries {
            let path = if dir.is_empty() {
                entry.name
            } else {
                format!("{}/{}", dir, entry.name)
            };
            if entry.is_dir {
                pending.push(path);
            } else {
                files.push(SnapshotEntry {
                    path,
                    is_dir: false,
                });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    empty_dirs.sort_by(|a, b| a.path.cmp(&b.path));
    files.extend(empty_dirs);
    Ok(files)
}
