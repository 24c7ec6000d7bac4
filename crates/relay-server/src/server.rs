//! Relay server: accepts clients and runs their request cycles.
//!
//! Connections are multiplexed on readiness rather than by polling each
//! socket in turn: every connection's read task wakes the server loop
//! only once a complete request has arrived. The loop itself executes one
//! request cycle at a time, so the registry needs no locking.

use crate::connection::{ClientConnection, CloseReason, ConnectionEvent, ConnectionId};
use crate::registry::WorkspaceRegistry;
use crate::session::{self, Outcome};
use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Relay server owning the registry and every live connection.
pub struct RelayServer {
    registry: WorkspaceRegistry,
    /// Live connections indexed by conn_id
    connections: HashMap<ConnectionId, ClientConnection>,
    /// Counter for generating connection IDs
    next_conn_id: ConnectionId,
    /// Channel sender handed to each connection's read task
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    /// Channel receiver for connection events
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl RelayServer {
    pub fn new(registry: WorkspaceRegistry) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            registry,
            connections: HashMap::new(),
            next_conn_id: 1,
            event_tx,
            event_rx,
        }
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("Relay server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Start serving a newly accepted TCP connection.
    pub fn accept_connection(&mut self, stream: TcpStream, address: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", address, e);
        }

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        info!("New connection from {} (conn_id: {})", address, conn_id);

        let conn = ClientConnection::new(conn_id, stream, address, self.event_tx.clone());
        self.connections.insert(conn_id, conn);
    }

    /// Process one connection event.
    pub async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Request { conn_id, request } => {
                // Requests still in flight from an evicted connection are dropped
                let Some(conn) = self.connections.get_mut(&conn_id) else {
                    debug!("Ignoring request for closed connection {}", conn_id);
                    return;
                };

                let address = conn.address;
                match session::handle_request(&mut self.registry, address, request, conn.writer())
                    .await
                {
                    Ok(Outcome::Continue) => {}
                    Ok(Outcome::Close) => self.evict(conn_id).await,
                    Err(e) => {
                        warn!("Request cycle for {} failed: {:#}", address, e);
                        self.evict(conn_id).await;
                    }
                }
            }
            ConnectionEvent::Closed { conn_id, reason } => {
                if let CloseReason::Error(e) = &reason {
                    debug!("Connection {} read side failed: {}", conn_id, e);
                }
                self.evict(conn_id).await;
            }
        }
    }

    /// Remove a connection and the pending queues held for its address.
    async fn evict(&mut self, conn_id: ConnectionId) {
        let Some(mut conn) = self.connections.remove(&conn_id) else {
            return;
        };
        conn.close().await;

        let workspaces = self.registry.evict(conn.address);
        info!(
            "Connection closed: {} (conn_id: {}, observed {} workspace(s))",
            conn.address, conn_id, workspaces
        );
    }

    /// Accept and serve clients until the listener fails.
    pub async fn run(&mut self, listener: &TcpListener) -> Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, address)) => self.accept_connection(stream, address),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event).await;
                }
            }
        }
    }

    /// Get the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
