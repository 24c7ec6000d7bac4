//! relay-client: Mirrors a local directory into a relay workspace.
//!
//! The [`reconciler`] establishes the initial mirror, after which
//! [`SyncClient`] pushes each [`watcher`] event as it happens and applies
//! remote changes on every poll.

pub mod client;
pub mod emitter;
pub mod link;
pub mod poller;
pub mod reconciler;
pub mod watcher;

pub use client::SyncClient;
pub use emitter::{ChangeEmitter, DEFAULT_TRANSIENT_PATTERN};
pub use link::ServerLink;
pub use reconciler::reconcile;
pub use watcher::{FileEvent, FileEventKind, FileWatcher, WatchControl};
