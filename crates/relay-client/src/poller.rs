//! Application of remote changes to the local tree.

use crate::watcher::WatchControl;
use anyhow::Result;
use relay_core::{FileSystem, Operation};
use tracing::{debug, info};

/// Apply operations received from the server with the watcher paused, so
/// the writes are not reported back as local changes.
///
/// Returns how many operations applied cleanly; failures are logged and
/// skipped.
pub async fn apply_remote<F, W>(fs: &F, watcher: &mut W, ops: &[Operation]) -> Result<usize>
where
    F: FileSystem + ?Sized,
    W: WatchControl + ?Sized,
{
    if ops.is_empty() {
        return Ok(0);
    }

    watcher.suspend()?;
    let applied = relay_core::apply_all(fs, ops).await;
    watcher.resume()?;

    if applied == ops.len() {
        debug!("Applied {} remote change(s)", applied);
    } else {
        info!("Applied {} of {} remote change(s)", applied, ops.len());
    }
    Ok(applied)
}
