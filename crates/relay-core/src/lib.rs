//! relay-core: Shared protocol and filesystem logic for directory relay sync.
//!
//! This crate provides the pieces both ends of a connection agree on:
//! - Binary wire codec for operations, handshakes and responses
//! - Workspace identifiers
//! - Translation between slash-separated wire paths and local paths
//! - `FileSystem` abstraction with a tokio-backed implementation
//! - Applying operations to a tree and walking a tree into a snapshot

pub mod apply;
pub mod fs;
pub mod path;
pub mod protocol;
pub mod snapshot;
pub mod workspace_id;

pub use apply::{apply_all, apply_operation};
pub use fs::{FileEntry, FileStat, FileSystem, FsError, NativeFs};
pub use protocol::{Command, Node, Operation, ProtocolError, Request};
pub use snapshot::{snapshot, SnapshotEntry};
pub use workspace_id::{WorkspaceId, WorkspaceIdError, WORKSPACE_ID_LEN};
