//! Binary wire protocol between relay clients and the relay server.
//!
//! All integers are little-endian and every variable-length field is
//! preceded by its `u32` length. There is no outer frame length: the
//! command tag alone determines which fields follow, so a reader must
//! consume exactly the bytes a frame declares or the stream is lost.
//!
//! ```text
//! Handshake  flag:u8 [workspace:bytes[128] command:u8 [operation body]]
//! Create     isDir:u8 pathLen:u32 path [dataLen:u32 data]
//! Delete     isDir:u8 pathLen:u32 path
//! Modify     pathLen:u32 path dataLen:u32 data
//! Move       isDir:u8 srcLen:u32 src dstLen:u32 dst
//! Updates    count:u32 (tag:u8 body)*count
//! Pull       (CREATE body)* END
//! ```

pub mod operation;
pub mod request;
pub mod response;

pub use operation::{Node, Operation};
pub use request::{Command, Request};
pub use response::{
    read_snapshot_item, read_updates, read_workspace_id, write_invalid_workspace,
    write_snapshot_end, write_updates, write_workspace_id,
};

use crate::path::{self, InvalidPath};
use crate::workspace_id::WorkspaceIdError;
use std::io::ErrorKind;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Command tags.
pub mod tag {
    /// Terminates a pull response.
    pub const END: u8 = 0;
    pub const CREATE: u8 = 1;
    pub const DELETE: u8 = 2;
    pub const MODIFY: u8 = 3;
    pub const MOVE: u8 = 4;
    pub const PULL: u8 = 5;
    pub const UPDATES: u8 = 6;
    /// Sent by the server for an unknown workspace, then the connection closes.
    pub const INVALID: u8 = 0xFF;

    /// Whether `tag` introduces an operation frame.
    pub fn is_operation(tag: u8) -> bool {
        matches!(tag, CREATE | DELETE | MODIFY | MOVE)
    }
}

/// Handshake flag: the client holds no workspace yet.
pub const FLAG_NEW: u8 = 0;
/// Handshake flag: a workspace identifier follows.
pub const FLAG_EXISTING: u8 = 1;

/// Upper bound on a single path field.
pub const MAX_PATH_LEN: u32 = 64 * 1024;
/// Upper bound on a single file payload (1 GiB).
pub const MAX_DATA_LEN: u32 = 1 << 30;

/// An already-serialized, tagged operation frame.
///
/// Frames are encoded once and shared between every queue they fan out to.
pub type Frame = Arc<[u8]>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Clean end of stream where a new frame would start.
    #[error("Peer disconnected")]
    Disconnected,

    #[error("Connection closed mid-frame")]
    Truncated,

    #[error("Unknown command tag {0}")]
    UnknownCommand(u8),

    #[error("Invalid handshake flag {0}")]
    InvalidFlag(u8),

    #[error("Path is not valid UTF-8")]
    InvalidUtf8,

    #[error("{field} length {len} exceeds limit {max}")]
    LengthExceeded {
        field: &'static str,
        len: u32,
        max: u32,
    },

    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    #[error(transparent)]
    InvalidWorkspaceId(#[from] WorkspaceIdError),

    #[error("Unknown workspace")]
    UnknownWorkspace,

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::UnexpectedEof {
            ProtocolError::Truncated
        } else {
            ProtocolError::Io(e)
        }
    }
}

impl ProtocolError {
    /// The byte stream can no longer be trusted and the connection must go.
    pub fn is_desync(&self) -> bool {
        !matches!(
            self,
            ProtocolError::Disconnected | ProtocolError::UnknownWorkspace | ProtocolError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Read the first byte of a frame, mapping end of stream to `Disconnected`.
pub async fn read_tag<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8> {
    match r.read_u8().await {
        Ok(b) => Ok(b),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(ProtocolError::Disconnected),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

async fn read_flag<R: AsyncRead + Unpin>(r: &mut R) -> Result<bool> {
    Ok(r.read_u8().await? != 0)
}

async fn read_len<R: AsyncRead + Unpin>(r: &mut R, field: &'static str, max: u32) -> Result<u32> {
    let len = r.read_u32_le().await?;
    if len > max {
        return Err(ProtocolError::LengthExceeded { field, len, max });
    }
    Ok(len)
}

async fn read_path<R: AsyncRead + Unpin>(r: &mut R) -> Result<String> {
    let len = read_len(r, "path", MAX_PATH_LEN).await?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    let raw = String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(path::normalize(&raw)?)
}

async fn read_data<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_len(r, "data", MAX_DATA_LEN).await?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

fn put_flag(buf: &mut Vec<u8>, flag: bool) {
    buf.push(u8::from(flag));
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}
