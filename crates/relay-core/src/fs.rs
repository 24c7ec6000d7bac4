//! FileSystem trait abstraction for the local tree a peer mirrors.
//!
//! All paths are wire paths relative to the tree root. The root itself is
//! addressed by the empty string for `list`.
//!
//! Implementations:
//! - `NativeFs` - Uses tokio::fs under a root directory

use crate::path::{self, InvalidPath};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    fn from_io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            FsError::NotFound(path.to_string())
        } else {
            FsError::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

/// File metadata
#[derive(Debug, Clone)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Local file I/O primitives used by the sync logic.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents; `""` lists the root
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Remove a file, or a directory and everything below it
    async fn remove(&self, path: &str) -> Result<()>;

    /// Rename `from` to `to` (creates parent directories of `to` if needed)
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Get metadata, `None` if nothing exists at `path`
    async fn stat(&self, path: &str) -> Result<Option<FileStat>>;

    /// Create directory (and parents if needed)
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove everything below the root, keeping the root itself
    async fn clear(&self) -> Result<()>;
}

/// Native filesystem rooted at a local directory.
#[derive(Debug, Clone)]
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            Ok(self.base_path.clone())
        } else {
            Ok(path::to_local(&self.base_path, path)?)
        }
    }

    async fn ensure_parent(&self, full_path: &Path, path: &str) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::from_io(path, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        fs::read(&full_path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        self.ensure_parent(&full_path, path).await?;
        fs::write(&full_path, content)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path)?;
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(path, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| FsError::from_io(path, e))?;

            entries.push(FileEntry {
                name,
                is_dir: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        let metadata = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        if metadata.is_dir() {
            fs::remove_dir_all(&full_path)
                .await
                .map_err(|e| FsError::from_io(path, e))
        } else {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| FsError::from_io(path, e))
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.full_path(from)?;
        let to_path = self.full_path(to)?;
        self.ensure_parent(&to_path, to).await?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| FsError::from_io(from, e))
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        let full_path = self.full_path(path)?;
        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(Some(FileStat {
                size: metadata.len(),
                is_dir: metadata.is_dir(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn clear(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| FsError::from_io("", e))?;
        for entry in self.list("").await? {
            self.remove(&entry.name).await?;
        }
        Ok(())
    }
}
