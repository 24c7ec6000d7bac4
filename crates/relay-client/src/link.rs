//! Client side of the relay protocol over one long-lived stream.

use relay_core::protocol::{self, ProtocolError, Result};
use relay_core::{Operation, Request, WorkspaceId};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::debug;

/// Connection to the relay server.
///
/// Requests are strictly sequential: every request must have its whole
/// response read before the next one is sent.
pub struct ServerLink<S> {
    stream: BufStream<S>,
}

impl ServerLink<TcpStream> {
    /// Connect to a relay server.
    pub async fn connect(address: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to {}", address);
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServerLink<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Send one request.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        self.stream
            .write_all(&request.encode())
            .await
            .map_err(ProtocolError::Io)?;
        self.stream.flush().await.map_err(ProtocolError::Io)
    }

    /// Ask the server to mint a workspace.
    pub async fn request_workspace(&mut self) -> Result<WorkspaceId> {
        self.send(&Request::NewWorkspace).await?;
        protocol::read_workspace_id(&mut self.stream).await
    }

    /// Start a full pull. Read the response with [`Self::next_snapshot_item`]
    /// until it returns `None`, then with [`Self::read_updates`].
    pub async fn start_pull(&mut self, workspace: &WorkspaceId) -> Result<()> {
        self.send(&Request::pull(workspace.clone())).await
    }

    pub async fn next_snapshot_item(&mut self) -> Result<Option<Operation>> {
        protocol::read_snapshot_item(&mut self.stream).await
    }

    pub async fn read_updates(&mut self) -> Result<Vec<Operation>> {
        protocol::read_updates(&mut self.stream).await
    }

    /// Drain the pending queue.
    pub async fn updates(&mut self, workspace: &WorkspaceId) -> Result<Vec<Operation>> {
        self.send(&Request::updates(workspace.clone())).await?;
        self.read_updates().await
    }

    /// Push a local change; returns the updates delivered with the reply.
    pub async fn push(&mut self, workspace: &WorkspaceId, op: Operation) -> Result<Vec<Operation>> {
        debug!("Pushing {} {}", op.kind(), op.path());
        self.send(&Request::push(workspace.clone(), op)).await?;
        self.read_updates().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Node;
    use relay_core::protocol::Frame;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn test_push_reads_piggybacked_updates() {
        let (client_end, mut server_end) = duplex(64 * 1024);
        let mut link = ServerLink::new(client_end);
        let id = WorkspaceId::generate();

        let queued = Operation::Delete {
            path: "old".into(),
            is_dir: false,
        };
        let frames: Vec<Frame> = vec![Arc::from(queued.encode())];
        protocol::write_updates(&mut server_end, &frames).await.unwrap();

        let pushed = Operation::Create {
            path: "new".into(),
            node: Node::Directory,
        };
        let delivered = link.push(&id, pushed.clone()).await.unwrap();
        assert_eq!(delivered, vec![queued]);

        let expected = Request::push(id, pushed).encode();
        let mut sent = vec![0u8; expected.len()];
        server_end.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn test_rejected_pull() {
        let (client_end, mut server_end) = duplex(1024);
        let mut link = ServerLink::new(client_end);

        protocol::write_invalid_workspace(&mut server_end).await.unwrap();
        drop(server_end);

        link.start_pull(&WorkspaceId::generate()).await.ok();
        assert!(matches!(
            link.next_snapshot_item().await,
            Err(ProtocolError::UnknownWorkspace)
        ));
    }

    #[tokio::test]
    async fn test_server_gone() {
        let (client_end, server_end) = duplex(1024);
        let mut link = ServerLink::new(client_end);
        drop(server_end);

        let err = link.updates(&WorkspaceId::generate()).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Disconnected | ProtocolError::Io(_)
        ));
    }
}
