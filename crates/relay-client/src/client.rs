//! Steady-state sync loop body: local events out, remote changes in.

use crate::emitter::ChangeEmitter;
use crate::link::ServerLink;
use crate::poller;
use crate::watcher::{FileEvent, WatchControl};
use anyhow::Result;
use relay_core::{FileSystem, WorkspaceId};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// A client attached to one workspace.
pub struct SyncClient<S, F, W> {
    link: ServerLink<S>,
    fs: F,
    workspace: WorkspaceId,
    emitter: ChangeEmitter,
    /// Source of local events; exposed so the caller can select on it
    pub watcher: W,
}

impl<S, F, W> SyncClient<S, F, W>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FileSystem,
    W: WatchControl,
{
    pub fn new(
        link: ServerLink<S>,
        fs: F,
        workspace: WorkspaceId,
        emitter: ChangeEmitter,
        watcher: W,
    ) -> Self {
        Self {
            link,
            fs,
            workspace,
            emitter,
            watcher,
        }
    }

    /// Push the operation for one local event, then apply whatever the
    /// server delivered with its reply.
    pub async fn on_file_event(&mut self, event: FileEvent) -> Result<()> {
        let op = match self.emitter.to_operation(&self.fs, &event).await {
            Ok(Some(op)) => op,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Skipping local change to {}: {}", event.path, e);
                return Ok(());
            }
        };

        let updates = self.link.push(&self.workspace, op).await?;
        poller::apply_remote(&self.fs, &mut self.watcher, &updates).await?;
        Ok(())
    }

    /// Fetch and apply queued remote changes.
    pub async fn poll(&mut self) -> Result<usize> {
        let updates = self.link.updates(&self.workspace).await?;
        if !updates.is_empty() {
            debug!("Received {} remote change(s)", updates.len());
        }
        poller::apply_remote(&self.fs, &mut self.watcher, &updates).await
    }
}
