//! Request cycle handling for one client.
//!
//! Each cycle: handshake, then either mint a workspace, or run one command
//! against an existing workspace and finish by draining the caller's own
//! pending queue. The drain always runs after the command so an operation
//! queued while the command ran is still delivered in this cycle.

use crate::registry::{RegistryError, WorkspaceRegistry, short};
use anyhow::Result;
use relay_core::protocol::{self, Command, Request};
use relay_core::{Node, Operation, WorkspaceId};
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// What the connection should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep serving the connection.
    Continue,
    /// The connection is unusable and must be closed.
    Close,
}

/// Run one request cycle, writing the response to `out`.
pub async fn handle_request<W: AsyncWrite + Unpin>(
    registry: &mut WorkspaceRegistry,
    address: SocketAddr,
    request: Request,
    out: &mut W,
) -> Result<Outcome> {
    match request {
        Request::NewWorkspace => {
            let id = registry.register_new_workspace().await?;
            registry.observe(&id, address)?;
            protocol::write_workspace_id(out, &id).await?;
            info!("Issued workspace {} to {}", short(&id), address);
            Ok(Outcome::Continue)
        }
        Request::MalformedWorkspace { .. } => {
            warn!("Rejecting {} with a malformed workspace id", address);
            protocol::write_invalid_workspace(out).await?;
            Ok(Outcome::Close)
        }
        Request::Existing { workspace, command } => {
            if !registry.contains(&workspace) {
                warn!(
                    "Rejecting {} for unknown workspace {}",
                    address,
                    short(&workspace)
                );
                protocol::write_invalid_workspace(out).await?;
                return Ok(Outcome::Close);
            }
            registry.observe(&workspace, address)?;

            match command {
                Command::Pull => stream_snapshot(registry, &workspace, out).await?,
                Command::Updates => {}
                Command::Push(op) => push(registry, &workspace, address, &op).await?,
            }

            let frames = registry.drain(&workspace, address)?;
            if !frames.is_empty() {
                debug!("Delivering {} queued frame(s) to {}", frames.len(), address);
            }
            protocol::write_updates(out, &frames).await?;
            Ok(Outcome::Continue)
        }
    }
}

async fn push(
    registry: &mut WorkspaceRegistry,
    workspace: &WorkspaceId,
    address: SocketAddr,
    op: &Operation,
) -> Result<()> {
    match registry.apply_and_broadcast(workspace, address, op).await {
        Ok(_) => Ok(()),
        // The tree refused the operation; nothing was queued and the
        // connection is still in sync.
        Err(RegistryError::Fs(e)) => {
            warn!(
                "Dropping {} {} from {}: {}",
                op.kind(),
                op.path(),
                address,
                e
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write the workspace tree as `Create` frames followed by `END`.
async fn stream_snapshot<W: AsyncWrite + Unpin>(
    registry: &WorkspaceRegistry,
    workspace: &WorkspaceId,
    out: &mut W,
) -> Result<()> {
    let entries = registry.snapshot(workspace).await?;
    let mut sent = 0;

    for entry in entries {
        let node = if entry.is_dir {
            Node::Directory
        } else {
            match registry.read(workspace, &entry.path).await {
                Ok(data) => Node::File(data),
                Err(RegistryError::Fs(e)) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        };
        let frame = Operation::Create {
            path: entry.path,
            node,
        }
        .encode();
        out.write_all(&frame).await?;
        sent += 1;
    }

    protocol::write_snapshot_end(out).await?;
    debug!("Streamed {} snapshot entries of {}", sent, short(workspace));
    Ok(())
}
