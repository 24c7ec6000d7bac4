//! Startup reconciliation of the local tree with the workspace.
//!
//! Runs before the watcher starts, so nothing here needs suspending.

use crate::emitter::ChangeEmitter;
use crate::link::ServerLink;
use crate::watcher::{FileEvent, FileEventKind};
use anyhow::{Context, Result, bail};
use relay_core::protocol::ProtocolError;
use relay_core::{FileSystem, Node, Operation, WorkspaceId};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

/// Join `workspace`, or create a new one when `None`.
///
/// Joining replaces the local tree with the server's copy. Creating pushes
/// the local tree to the new workspace. Returns the workspace in use.
pub async fn reconcile<S, F>(
    link: &mut ServerLink<S>,
    fs: &F,
    workspace: Option<WorkspaceId>,
    emitter: &ChangeEmitter,
) -> Result<WorkspaceId>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FileSystem + ?Sized,
{
    match workspace {
        Some(id) => {
            pull_workspace(link, fs, &id).await?;
            Ok(id)
        }
        None => {
            let id = link
                .request_workspace()
                .await
                .context("Failed to create workspace")?;
            push_tree(link, fs, &id, emitter).await?;
            Ok(id)
        }
    }
}

/// Wipe the local tree and mirror the workspace into it.
async fn pull_workspace<S, F>(link: &mut ServerLink<S>, fs: &F, id: &WorkspaceId) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FileSystem + ?Sized,
{
    link.start_pull(id).await?;

    // The local tree is only wiped once the server has accepted the id
    let first = match link.next_snapshot_item().await {
        Err(ProtocolError::UnknownWorkspace) => bail!("Server does not know workspace {}", id),
        other => other?,
    };
    fs.clear().await.context("Failed to clear local tree")?;

    let mut next = first;
    let mut created = 0;
    while let Some(op) = next {
        match relay_core::apply_operation(fs, &op).await {
            Ok(()) => created += 1,
            Err(e) => warn!("Failed to materialize {}: {}", op.path(), e),
        }
        next = link.next_snapshot_item().await?;
    }

    let updates = link.read_updates().await?;
    let applied = relay_core::apply_all(fs, &updates).await;
    info!("Pulled {} entries and {} queued change(s)", created, applied);
    Ok(())
}

/// Push every local file and every empty directory.
async fn push_tree<S, F>(
    link: &mut ServerLink<S>,
    fs: &F,
    id: &WorkspaceId,
    emitter: &ChangeEmitter,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FileSystem + ?Sized,
{
    let entries = relay_core::snapshot(fs)
        .await
        .context("Failed to walk local tree")?;
    let mut pushed = 0;

    for entry in entries {
        if emitter.is_transient(&entry.path) {
            continue;
        }

        let op = if entry.is_dir {
            Operation::Create {
                path: entry.path,
                node: Node::Directory,
            }
        } else {
            let event = FileEvent {
                path: entry.path,
                kind: FileEventKind::Created,
                is_dir: false,
            };
            match emitter.to_operation(fs, &event).await {
                Ok(Some(op)) => op,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping local file {}: {}", event.path, e);
                    continue;
                }
            }
        };

        let updates = link.push(id, op).await?;
        relay_core::apply_all(fs, &updates).await;
        pushed += 1;
    }

    info!("Pushed local tree ({} entries) to new workspace", pushed);
    Ok(())
}
