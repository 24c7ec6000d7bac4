//! Operation frames: the four replayable tree changes.

use super::{
    ProtocolError, Result, put_bytes, put_flag, read_data, read_flag, read_path, read_tag, tag,
};
use tokio::io::AsyncRead;

/// What a `Create` brings into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory,
    File(Vec<u8>),
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory)
    }
}

/// One change to a workspace tree. Paths are normalized wire paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create { path: String, node: Node },
    Delete { path: String, is_dir: bool },
    /// Files only; directories are created or deleted, never modified.
    Modify { path: String, data: Vec<u8> },
    Move { from: String, to: String, is_dir: bool },
}

impl Operation {
    pub fn tag(&self) -> u8 {
        match self {
            Operation::Create { .. } => tag::CREATE,
            Operation::Delete { .. } => tag::DELETE,
            Operation::Modify { .. } => tag::MODIFY,
            Operation::Move { .. } => tag::MOVE,
        }
    }

    /// The path the operation acts on (the source for moves).
    pub fn path(&self) -> &str {
        match self {
            Operation::Create { path, .. }
            | Operation::Delete { path, .. }
            | Operation::Modify { path, .. } => path,
            Operation::Move { from, .. } => from,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Delete { .. } => "delete",
            Operation::Modify { .. } => "modify",
            Operation::Move { .. } => "move",
        }
    }

    /// Serialize to a tagged frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.tag()];
        self.encode_body(&mut buf);
        buf
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            Operation::Create { path, node } => {
                put_flag(buf, node.is_dir());
                put_bytes(buf, path.as_bytes());
                if let Node::File(data) = node {
                    put_bytes(buf, data);
                }
            }
            Operation::Delete { path, is_dir } => {
                put_flag(buf, *is_dir);
                put_bytes(buf, path.as_bytes());
            }
            Operation::Modify { path, data } => {
                put_bytes(buf, path.as_bytes());
                put_bytes(buf, data);
            }
            Operation::Move { from, to, is_dir } => {
                put_flag(buf, *is_dir);
                put_bytes(buf, from.as_bytes());
                put_bytes(buf, to.as_bytes());
            }
        }
    }

    /// Decode the body that follows an already-consumed operation tag.
    pub async fn read_body<R: AsyncRead + Unpin>(op_tag: u8, r: &mut R) -> Result<Self> {
        match op_tag {
            tag::CREATE => {
                let is_dir = read_flag(r).await?;
                let path = read_path(r).await?;
                let node = if is_dir {
                    Node::Directory
                } else {
                    Node::File(read_data(r).await?)
                };
                Ok(Operation::Create { path, node })
            }
            tag::DELETE => {
                let is_dir = read_flag(r).await?;
                let path = read_path(r).await?;
                Ok(Operation::Delete { path, is_dir })
            }
            tag::MODIFY => {
                let path = read_path(r).await?;
                let data = read_data(r).await?;
                Ok(Operation::Modify { path, data })
            }
            tag::MOVE => {
                let is_dir = read_flag(r).await?;
                let from = read_path(r).await?;
                let to = read_path(r).await?;
                Ok(Operation::Move { from, to, is_dir })
            }
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }

    /// Decode a complete tagged frame.
    ///
    /// A missing tag is `Disconnected`; a tag that is not an operation
    /// is `UnknownCommand`.
    pub async fn read_tagged<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self> {
        let op_tag = read_tag(r).await?;
        Self::read_body(op_tag, r).await
    }
}
