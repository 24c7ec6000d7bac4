//! relay-server library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the server components,
//! allowing integration tests to run a server in-process.

pub mod connection;
pub mod registry;
pub mod server;
pub mod session;

// Re-export key types for convenience
pub use connection::{ClientConnection, CloseReason, ConnectionEvent, ConnectionId};
pub use registry::{RegistryError, WorkspaceRegistry};
pub use server::RelayServer;
pub use session::{handle_request, Outcome};
