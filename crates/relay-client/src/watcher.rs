//! File watcher for the local workspace root.
//!
//! Raw notifications are mapped to [`FileEvent`]s and delivered in order.
//! Nothing is debounced or coalesced.

use anyhow::Result;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use relay_core::path;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// File event from the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Path relative to the workspace root
    pub path: String,
    pub kind: FileEventKind,
    pub is_dir: bool,
}

/// Type of file event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Deleted,
    Modified,
    /// Renamed within the root; `path` is the source
    Moved { to: String },
}

impl FileEvent {
    fn new(path: String, kind: FileEventKind, is_dir: bool) -> Self {
        Self { path, kind, is_dir }
    }
}

/// Pausing of change reports while the client writes remote changes.
pub trait WatchControl {
    fn suspend(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
}

/// Half of a rename waiting for its destination.
#[derive(Debug)]
struct PendingRename {
    tracker: Option<usize>,
    path: String,
}

/// Maps notify events to [`FileEvent`]s.
///
/// Backends report renames as a `From` half and a `To` half sharing a
/// tracker, sometimes followed by a combined `Both` event. The halves are
/// paired here; a `From` with no matching `To` means the entry left the
/// root and is reported as a deletion once the next unrelated event shows
/// up.
#[derive(Debug)]
struct EventMapper {
    root: PathBuf,
    pending: Option<PendingRename>,
    /// Tracker of the last rename already reported from its halves
    completed: Option<usize>,
}

impl EventMapper {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            pending: None,
            completed: None,
        }
    }

    fn wire(&self, local: &Path) -> Option<String> {
        path::to_wire(&self.root, local)
    }

    /// Report an unpaired `From` as a deletion.
    fn flush_pending(&mut self, out: &mut Vec<FileEvent>) {
        if let Some(pending) = self.pending.take() {
            out.push(FileEvent::new(pending.path, FileEventKind::Deleted, false));
        }
    }

    fn map(&mut self, event: &Event) -> Vec<FileEvent> {
        let mut out = Vec::new();
        let tracker = event.tracker();

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                self.flush_pending(&mut out);
                if let Some(from) = event.paths.first().and_then(|p| self.wire(p)) {
                    self.pending = Some(PendingRename {
                        tracker,
                        path: from,
                    });
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(local) = event.paths.first() else {
                    return out;
                };
                let is_dir = local.is_dir();
                let to = self.wire(local);

                let paired = match &self.pending {
                    Some(p) => tracker.is_some() && p.tracker == tracker,
                    None => false,
                };
                if paired {
                    let from = self.pending.take().map(|p| p.path);
                    self.completed = tracker;
                    match (from, to) {
                        (Some(from), Some(to)) => out.push(FileEvent::new(
                            from,
                            FileEventKind::Moved { to },
                            is_dir,
                        )),
                        (Some(from), None) => {
                            out.push(FileEvent::new(from, FileEventKind::Deleted, is_dir))
                        }
                        _ => {}
                    }
                } else {
                    self.flush_pending(&mut out);
                    if let Some(to) = to {
                        out.push(FileEvent::new(to, FileEventKind::Created, is_dir));
                    }
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if tracker.is_some() && self.completed == tracker {
                    self.completed = None;
                    return out;
                }
                if self.pending.as_ref().is_some_and(|p| p.tracker == tracker) {
                    self.pending = None;
                }
                self.flush_pending(&mut out);

                let (Some(from), Some(to)) = (event.paths.first(), event.paths.get(1)) else {
                    return out;
                };
                let is_dir = to.is_dir();
                match (self.wire(from), self.wire(to)) {
                    (Some(from), Some(to)) => {
                        out.push(FileEvent::new(from, FileEventKind::Moved { to }, is_dir))
                    }
                    (Some(from), None) => {
                        out.push(FileEvent::new(from, FileEventKind::Deleted, is_dir))
                    }
                    (None, Some(to)) => {
                        out.push(FileEvent::new(to, FileEventKind::Created, is_dir))
                    }
                    (None, None) => {}
                }
            }

            // Backends that cannot tell the halves apart
            EventKind::Modify(ModifyKind::Name(_)) => {
                self.flush_pending(&mut out);
                for local in &event.paths {
                    let Some(wire) = self.wire(local) else {
                        continue;
                    };
                    if local.exists() {
                        out.push(FileEvent::new(wire, FileEventKind::Created, local.is_dir()));
                    } else {
                        out.push(FileEvent::new(wire, FileEventKind::Deleted, false));
                    }
                }
            }

            EventKind::Create(kind) => {
                self.flush_pending(&mut out);
                for local in &event.paths {
                    let is_dir = match kind {
                        CreateKind::Folder => true,
                        CreateKind::File => false,
                        _ => local.is_dir(),
                    };
                    if let Some(wire) = self.wire(local) {
                        out.push(FileEvent::new(wire, FileEventKind::Created, is_dir));
                    }
                }
            }

            EventKind::Remove(kind) => {
                self.flush_pending(&mut out);
                for local in &event.paths {
                    if let Some(wire) = self.wire(local) {
                        let is_dir = kind == RemoveKind::Folder;
                        out.push(FileEvent::new(wire, FileEventKind::Deleted, is_dir));
                    }
                }
            }

            EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) => {}

            EventKind::Modify(_) => {
                self.flush_pending(&mut out);
                for local in &event.paths {
                    // Directory content changes arrive as their own events
                    if local.is_dir() {
                        continue;
                    }
                    if let Some(wire) = self.wire(local) {
                        out.push(FileEvent::new(wire, FileEventKind::Modified, false));
                    }
                }
            }

            _ => {
                trace!("Ignoring unclassified event {:?}", event);
            }
        }

        out
    }
}

/// File watcher that monitors the workspace root.
pub struct FileWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
    suspended: bool,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    pub fn new(root: PathBuf) -> Result<Self> {
        // FSEvents reports canonical paths, so strip prefixes against those
        let root = root.canonicalize().unwrap_or(root);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut mapper = EventMapper::new(root.clone());

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for file_event in mapper.map(&event) {
                        debug!("File event: {:?}", file_event);
                        if event_tx.send(file_event).is_err() {
                            // Receiver dropped
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok(Self {
            root,
            watcher,
            event_rx,
            suspended: false,
        })
    }

    /// Get the receiver for file events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileEvent> {
        &mut self.event_rx
    }
}

impl WatchControl for FileWatcher {
    /// Stop observing the root. Events already queued stay in the channel.
    fn suspend(&mut self) -> Result<()> {
        if !self.suspended {
            self.watcher.unwatch(&self.root)?;
            self.suspended = true;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.suspended {
            self.watcher.watch(&self.root, RecursiveMode::Recursive)?;
            self.suspended = false;
        }
        Ok(())
    }
}
