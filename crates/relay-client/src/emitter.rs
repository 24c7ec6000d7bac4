//! Translation of local file events into protocol operations.

use crate::watcher::{FileEvent, FileEventKind};
use relay_core::path;
use relay_core::protocol::MAX_DATA_LEN;
use relay_core::{FileSystem, FsError, Node, Operation};
use tracing::{debug, warn};

/// Substring that marks the temporary files GLib-based editors write before
/// renaming them over the real file.
pub const DEFAULT_TRANSIENT_PATTERN: &str = ".goutputstream";

/// Turns [`FileEvent`]s into the operations to push.
#[derive(Debug, Clone)]
pub struct ChangeEmitter {
    transient_patterns: Vec<String>,
}

impl Default for ChangeEmitter {
    fn default() -> Self {
        Self::new(vec![DEFAULT_TRANSIENT_PATTERN.to_string()])
    }
}

impl ChangeEmitter {
    pub fn new(transient_patterns: Vec<String>) -> Self {
        Self { transient_patterns }
    }

    /// Whether `path` names an editor's transient file.
    pub fn is_transient(&self, path: &str) -> bool {
        self.transient_patterns
            .iter()
            .any(|pattern| path.contains(pattern.as_str()))
    }

    /// Read a file for upload.
    ///
    /// `Ok(None)` when the file vanished before it could be read or is too
    /// large to send.
    async fn read_for_upload<F: FileSystem + ?Sized>(
        fs: &F,
        path: &str,
    ) -> Result<Option<Vec<u8>>, FsError> {
        let data = match fs.read(path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("{} vanished before it was read", path);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if data.len() > MAX_DATA_LEN as usize {
            warn!(
                "Not syncing {}: {} bytes exceeds the {} byte limit",
                path,
                data.len(),
                MAX_DATA_LEN
            );
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// The operation describing `event`, if it should be pushed.
    pub async fn to_operation<F: FileSystem + ?Sized>(
        &self,
        fs: &F,
        event: &FileEvent,
    ) -> Result<Option<Operation>, FsError> {
        let path = event.path.clone();

        let op = match &event.kind {
            FileEventKind::Moved { to } => {
                match (self.is_transient(&path), self.is_transient(to)) {
                    (false, false) => Some(Operation::Move {
                        from: path,
                        to: to.clone(),
                        is_dir: event.is_dir,
                    }),
                    // Atomic save: the temporary file replaced the real one
                    (true, false) if !event.is_dir => Self::read_for_upload(fs, to)
                        .await?
                        .map(|data| Operation::Modify {
                            path: to.clone(),
                            data,
                        }),
                    (true, false) => None,
                    (false, true) => Some(Operation::Delete {
                        path,
                        is_dir: event.is_dir,
                    }),
                    (true, true) => None,
                }
            }
            _ if self.is_transient(&path) => None,
            FileEventKind::Created if event.is_dir => Some(Operation::Create {
                path,
                node: Node::Directory,
            }),
            FileEventKind::Created => Self::read_for_upload(fs, &path)
                .await?
                .map(|data| Operation::Create {
                    path,
                    node: Node::File(data),
                }),
            FileEventKind::Deleted => Some(Operation::Delete {
                path,
                is_dir: event.is_dir,
            }),
            FileEventKind::Modified if event.is_dir => None,
            FileEventKind::Modified => Self::read_for_upload(fs, &path)
                .await?
                .map(|data| Operation::Modify { path, data }),
        };

        Ok(op.filter(Self::has_wire_paths))
    }

    /// Whether every path of `op` survives the server's path checks.
    ///
    /// An operation the server would refuse to decode costs the connection,
    /// so it is dropped here instead.
    fn has_wire_paths(op: &Operation) -> bool {
        let to = match op {
            Operation::Move { to, .. } => Some(to.as_str()),
            _ => None,
        };
        for p in std::iter::once(op.path()).chain(to) {
            if let Err(e) = path::normalize(p) {
                warn!("Not syncing {} {}: {}", op.kind(), op.path(), e);
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::NativeFs;
    use tempfile::TempDir;

    fn event(path: &str, kind: FileEventKind, is_dir: bool) -> FileEvent {
        FileEvent {
            path: path.into(),
            kind,
            is_dir,
        }
    }

    fn setup() -> (TempDir, NativeFs) {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_create_reads_contents() {
        let (_dir, fs) = setup();
        fs.write("a/b.txt", b"hello").await.unwrap();
        let emitter = ChangeEmitter::default();

        let op = emitter
            .to_operation(&fs, &event("a/b.txt", FileEventKind::Created, false))
            .await
            .unwrap();
        assert_eq!(
            op,
            Some(Operation::Create {
                path: "a/b.txt".into(),
                node: Node::File(b"hello".to_vec()),
            })
        );

        let op = emitter
            .to_operation(&fs, &event("a", FileEventKind::Created, true))
            .await
            .unwrap();
        assert_eq!(
            op,
            Some(Operation::Create {
                path: "a".into(),
                node: Node::Directory,
            })
        );
    }

    #[tokio::test]
    async fn test_atomic_save_becomes_modify() {
        let (_dir, fs) = setup();
        fs.write("notes.txt", b"saved").await.unwrap();
        let emitter = ChangeEmitter::default();

        let op = emitter
            .to_operation(
                &fs,
                &event(
                    ".goutputstream-XYZ123",
                    FileEventKind::Moved {
                        to: "notes.txt".into(),
                    },
                    false,
                ),
            )
            .await
            .unwrap();
        assert_eq!(
            op,
            Some(Operation::Modify {
                path: "notes.txt".into(),
                data: b"saved".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn test_transient_files_are_ignored() {
        let (_dir, fs) = setup();
        fs.write(".goutputstream-ABC", b"tmp").await.unwrap();
        let emitter = ChangeEmitter::default();

        for kind in [
            FileEventKind::Created,
            FileEventKind::Modified,
            FileEventKind::Deleted,
        ] {
            let op = emitter
                .to_operation(&fs, &event(".goutputstream-ABC", kind, false))
                .await
                .unwrap();
            assert_eq!(op, None);
        }
    }

    #[tokio::test]
    async fn test_custom_patterns() {
        let emitter = ChangeEmitter::new(vec!["~".into(), ".swp".into()]);
        assert!(emitter.is_transient("dir/.file.swp"));
        assert!(emitter.is_transient("file~"));
        assert!(!emitter.is_transient(".goutputstream-1"));
    }

    #[tokio::test]
    async fn test_plain_move_and_delete() {
        let (_dir, fs) = setup();
        let emitter = ChangeEmitter::default();

        let op = emitter
            .to_operation(
                &fs,
                &event("x", FileEventKind::Moved { to: "y".into() }, true),
            )
            .await
            .unwrap();
        assert_eq!(
            op,
            Some(Operation::Move {
                from: "x".into(),
                to: "y".into(),
                is_dir: true,
            })
        );

        let op = emitter
            .to_operation(&fs, &event("gone", FileEventKind::Deleted, false))
            .await
            .unwrap();
        assert_eq!(
            op,
            Some(Operation::Delete {
                path: "gone".into(),
                is_dir: false,
            })
        );
    }

    #[tokio::test]
    async fn test_unsendable_path_is_skipped() {
        let (_dir, fs) = setup();
        let emitter = ChangeEmitter::default();
        let op = emitter
            .to_operation(
                &fs,
                &event("ok.txt", FileEventKind::Moved { to: "bad\0name".into() }, false),
            )
            .await
            .unwrap();
        assert_eq!(op, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_colon_in_name_is_synced() {
        let (_dir, fs) = setup();
        let emitter = ChangeEmitter::default();
        let op = emitter
            .to_operation(
                &fs,
                &event(
                    "a/b.txt",
                    FileEventKind::Moved {
                        to: "a/b 10:30.txt".into(),
                    },
                    false,
                ),
            )
            .await
            .unwrap();
        assert_eq!(
            op,
            Some(Operation::Move {
                from: "a/b.txt".into(),
                to: "a/b 10:30.txt".into(),
                is_dir: false,
            })
        );
    }

    #[tokio::test]
    async fn test_vanished_file_is_skipped() {
        let (_dir, fs) = setup();
        let emitter = ChangeEmitter::default();
        let op = emitter
            .to_operation(&fs, &event("never.txt", FileEventKind::Modified, false))
            .await
            .unwrap();
        assert_eq!(op, None);
    }
}
