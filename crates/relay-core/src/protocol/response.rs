//! Server responses.
//!
//! - New workspace: the 128 identifier bytes
//! - Pull: tagged `Create` frames, then `END`, then an updates block
//! - Updates and pushes: an updates block
//! - Unknown workspace: `INVALID`, then the server closes the connection

use super::operation::Operation;
use super::{Frame, ProtocolError, Result, read_tag, tag};
use crate::workspace_id::{WORKSPACE_ID_LEN, WorkspaceId};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub async fn write_workspace_id<W: AsyncWrite + Unpin>(w: &mut W, id: &WorkspaceId) -> Result<()> {
    w.write_all(id.as_bytes()).await.map_err(ProtocolError::Io)?;
    w.flush().await.map_err(ProtocolError::Io)
}

pub async fn read_workspace_id<R: AsyncRead + Unpin>(r: &mut R) -> Result<WorkspaceId> {
    let mut raw = [0u8; WORKSPACE_ID_LEN];
    raw[0] = read_tag(r).await?;
    r.read_exact(&mut raw[1..]).await?;
    Ok(WorkspaceId::from_bytes(&raw)?)
}

/// Write an updates block: `count:u32` followed by the frames verbatim.
pub async fn write_updates<W: AsyncWrite + Unpin>(w: &mut W, frames: &[Frame]) -> Result<()> {
    w.write_u32_le(frames.len() as u32)
        .await
        .map_err(ProtocolError::Io)?;
    for frame in frames {
        w.write_all(frame).await.map_err(ProtocolError::Io)?;
    }
    w.flush().await.map_err(ProtocolError::Io)
}

/// Read an updates block.
///
/// A lone `INVALID` byte followed by end of stream is the server's
/// unknown-workspace rejection and maps to `UnknownWorkspace`.
pub async fn read_updates<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<Operation>> {
    let first = read_tag(r).await?;
    let mut rest = [0u8; 3];
    if let Err(e) = r.read_exact(&mut rest).await {
        if first == tag::INVALID && e.kind() == ErrorKind::UnexpectedEof {
            return Err(ProtocolError::UnknownWorkspace);
        }
        return Err(e.into());
    }
    let count = u32::from_le_bytes([first, rest[0], rest[1], rest[2]]);

    let mut operations = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let op_tag = r.read_u8().await?;
        operations.push(Operation::read_body(op_tag, r).await?);
    }
    Ok(operations)
}

pub async fn write_snapshot_end<W: AsyncWrite + Unpin>(w: &mut W) -> Result<()> {
    w.write_u8(tag::END).await.map_err(ProtocolError::Io)
}

pub async fn write_invalid_workspace<W: AsyncWrite + Unpin>(w: &mut W) -> Result<()> {
    w.write_u8(tag::INVALID).await.map_err(ProtocolError::Io)?;
    w.flush().await.map_err(ProtocolError::Io)
}

/// Read the next item of a pull response; `None` marks the end.
pub async fn read_snapshot_item<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Operation>> {
    match read_tag(r).await? {
        tag::END => Ok(None),
        tag::INVALID => Err(ProtocolError::UnknownWorkspace),
        tag::CREATE => Ok(Some(Operation::read_body(tag::CREATE, r).await?)),
        other => Err(ProtocolError::UnknownCommand(other)),
    }
}
