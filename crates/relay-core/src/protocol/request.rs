//! Client requests: the handshake plus the command it selects.

use super::operation::Operation;
use super::{FLAG_EXISTING, FLAG_NEW, ProtocolError, Result, read_tag, tag};
use crate::workspace_id::{WORKSPACE_ID_LEN, WorkspaceId};
use tokio::io::{AsyncRead, AsyncReadExt};

/// What a client asks of a workspace it already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Full snapshot of the tree.
    Pull,
    /// Drain of the pending queue.
    Updates,
    /// A local change to apply and broadcast.
    Push(Operation),
}

/// One request cycle, starting with the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Mint a workspace identifier for me.
    NewWorkspace,
    Existing {
        workspace: WorkspaceId,
        command: Command,
    },
    /// A handshake whose identifier bytes are not a well-formed id, so it
    /// cannot name any issued workspace. The id field has a fixed length,
    /// so the command after it is still decoded.
    MalformedWorkspace { raw: Vec<u8>, command: Command },
}

impl Request {
    pub fn pull(workspace: WorkspaceId) -> Self {
        Request::Existing {
            workspace,
            command: Command::Pull,
        }
    }

    pub fn updates(workspace: WorkspaceId) -> Self {
        Request::Existing {
            workspace,
            command: Command::Updates,
        }
    }

    pub fn push(workspace: WorkspaceId, operation: Operation) -> Self {
        Request::Existing {
            workspace,
            command: Command::Push(operation),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Request::NewWorkspace => vec![FLAG_NEW],
            Request::Existing { workspace, command } => {
                Self::encode_existing(workspace.as_bytes(), command)
            }
            Request::MalformedWorkspace { raw, command } => Self::encode_existing(raw, command),
        }
    }

    fn encode_existing(id: &[u8], command: &Command) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + id.len());
        buf.push(FLAG_EXISTING);
        buf.extend_from_slice(id);
        match command {
            Command::Pull => buf.push(tag::PULL),
            Command::Updates => buf.push(tag::UPDATES),
            Command::Push(op) => buf.extend_from_slice(&op.encode()),
        }
        buf
    }

    /// Read one request.
    ///
    /// End of stream before the flag byte is `Disconnected`; anywhere
    /// later it is `Truncated`.
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self> {
        match read_tag(r).await? {
            FLAG_NEW => Ok(Request::NewWorkspace),
            FLAG_EXISTING => {
                let mut raw = [0u8; WORKSPACE_ID_LEN];
                r.read_exact(&mut raw).await?;

                let command = match r.read_u8().await? {
                    tag::PULL => Command::Pull,
                    tag::UPDATES => Command::Updates,
                    op_tag if tag::is_operation(op_tag) => {
                        Command::Push(Operation::read_body(op_tag, r).await?)
                    }
                    other => return Err(ProtocolError::UnknownCommand(other)),
                };

                match WorkspaceId::from_bytes(&raw) {
                    Ok(workspace) => Ok(Request::Existing { workspace, command }),
                    Err(_) => Ok(Request::MalformedWorkspace {
                        raw: raw.to_vec(),
                        command,
                    }),
                }
            }
            other => Err(ProtocolError::InvalidFlag(other)),
        }
    }
}
