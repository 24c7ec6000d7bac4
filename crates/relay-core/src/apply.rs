//! Applying operations to a tree.
//!
//! The server and clients share this logic so that replaying the same
//! operations in the same order yields the same tree everywhere.
//! Conflicts with the current tree state are resolved in place rather
//! than reported: a missing delete target is ignored, an occupied move
//! destination is cleared first.

use crate::fs::{FileSystem, Result};
use crate::protocol::{Node, Operation};
use tracing::{debug, warn};

/// Apply one operation.
pub async fn apply_operation<F: FileSystem + ?Sized>(fs: &F, op: &Operation) -> Result<()> {
    match op {
        Operation::Create {
            path,
            node: Node::Directory,
        } => fs.mkdir(path).await,
        Operation::Create {
            path,
            node: Node::File(data),
        }
        | Operation::Modify { path, data } => {
            if let Some(stat) = fs.stat(path).await? {
                if stat.is_dir {
                    debug!("Replacing directory {} with a file", path);
                    fs.remove(path).await?;
                }
            }
            fs.write(path, data).await
        }
        Operation::Delete { path, .. } => match fs.remove(path).await {
            Err(e) if e.is_not_found() => {
                debug!("Delete of missing path {}, ignoring", path);
                Ok(())
            }
            other => other,
        },
        Operation::Move { from, to, .. } => {
            if from == to {
                return Ok(());
            }
            if fs.stat(from).await?.is_none() {
                debug!("Move source {} is missing, ignoring", from);
                return Ok(());
            }
            if fs.stat(to).await?.is_some() {
                debug!("Clearing occupied move destination {}", to);
                fs.remove(to).await?;
            }
            fs.rename(from, to).await
        }
    }
}

/// Apply operations in order, continuing past failures.
///
/// Returns the number of operations applied successfully.
pub async fn apply_all<F: FileSystem + ?Sized>(fs: &F, ops: &[Operation]) -> usize {
    let mut applied = 0;
    for op in ops {
        match apply_operation(fs, op).await {
            Ok(()) => {
                debug!("Applied {} {}", op.kind(), op.path());
                applied += 1;
            }
            Err(e) => warn!("Failed to apply {} {}: {}", op.kind(), op.path(), e),
        }
    }
    applied
}
