//! Individual client connection management.
//!
//! Each connection splits its TCP stream: a spawned read task decodes
//! complete requests and forwards them to the server loop, while the
//! write half stays with the server so responses are written by the one
//! loop that owns the registry.

use relay_core::protocol::ProtocolError;
use relay_core::Request;
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Server-assigned connection identifier.
pub type ConnectionId = u64;

/// Why a connection's read side stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed the stream between requests.
    Disconnected,
    /// The stream can no longer be decoded, or the socket failed.
    Error(ProtocolError),
}

/// Event emitted by a connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A complete request was decoded
    Request {
        conn_id: ConnectionId,
        request: Request,
    },
    /// Connection read side ended
    Closed {
        conn_id: ConnectionId,
        reason: CloseReason,
    },
}

/// A single client connection.
pub struct ClientConnection {
    pub conn_id: ConnectionId,
    /// Remote address; also the key of the client's pending queues
    pub address: SocketAddr,
    writer: BufWriter<OwnedWriteHalf>,
    /// Handle to the read task
    read_task: Option<JoinHandle<()>>,
}

impl ClientConnection {
    /// Wrap an accepted stream and spawn its read task.
    pub fn new(
        conn_id: ConnectionId,
        stream: TcpStream,
        address: SocketAddr,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (read, write) = stream.into_split();

        let read_task = tokio::spawn(async move {
            Self::read_loop(conn_id, read, event_tx).await;
        });

        Self {
            conn_id,
            address,
            writer: BufWriter::new(write),
            read_task: Some(read_task),
        }
    }

    /// Read loop that forwards decoded requests to the event channel.
    async fn read_loop(
        conn_id: ConnectionId,
        read: OwnedReadHalf,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) {
        let mut reader = BufReader::new(read);

        let reason = loop {
            match Request::read_from(&mut reader).await {
                Ok(request) => {
                    if event_tx
                        .send(ConnectionEvent::Request { conn_id, request })
                        .is_err()
                    {
                        // Server loop is gone
                        return;
                    }
                }
                Err(ProtocolError::Disconnected) => {
                    debug!("Connection {} closed by peer", conn_id);
                    break CloseReason::Disconnected;
                }
                Err(e) => {
                    warn!("Dropping connection {}: {}", conn_id, e);
                    break CloseReason::Error(e);
                }
            }
        };

        let _ = event_tx.send(ConnectionEvent::Closed { conn_id, reason });
    }

    /// Buffered write half for responses.
    pub fn writer(&mut self) -> &mut BufWriter<OwnedWriteHalf> {
        &mut self.writer
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        let _ = self.writer.shutdown().await;

        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}
