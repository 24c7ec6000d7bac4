//! Workspace registry: the server's sync state.
//!
//! Maps each workspace identifier to its root directory and to one
//! pending-operation queue per observing client. Nothing else mutates
//! this state.

use relay_core::protocol::Frame;
use relay_core::{FileSystem, FsError, NativeFs, Operation, SnapshotEntry, WorkspaceId};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown workspace {0}")]
    UnknownWorkspace(WorkspaceId),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Data directory {path:?}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// One workspace: its tree and the backlog of every observer.
struct Workspace {
    fs: NativeFs,
    queues: HashMap<SocketAddr, VecDeque<Frame>>,
}

impl Workspace {
    fn new(root: PathBuf) -> Self {
        Self {
            fs: NativeFs::new(root),
            queues: HashMap::new(),
        }
    }
}

/// Owner of every workspace tree and pending queue.
pub struct WorkspaceRegistry {
    data_dir: PathBuf,
    workspaces: HashMap<WorkspaceId, Workspace>,
}

impl WorkspaceRegistry {
    /// Create an empty registry storing trees under `data_dir`.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            workspaces: HashMap::new(),
        }
    }

    /// Open `data_dir`, adopting every subdirectory named like a workspace.
    ///
    /// Trees survive restarts; pending queues do not.
    pub async fn load(data_dir: PathBuf) -> Result<Self> {
        let data_dir_err = |source| RegistryError::DataDir {
            path: data_dir.clone(),
            source,
        };

        fs::create_dir_all(&data_dir).await.map_err(data_dir_err)?;
        let mut registry = Self::new(data_dir.clone());

        let mut dir = fs::read_dir(&data_dir).await.map_err(data_dir_err)?;
        while let Some(entry) = dir.next_entry().await.map_err(data_dir_err)? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let (true, Ok(id)) = (is_dir, name.parse::<WorkspaceId>()) {
                registry
                    .workspaces
                    .insert(id, Workspace::new(entry.path()));
            }
        }

        info!(
            "Loaded {} workspace(s) from {:?}",
            registry.workspaces.len(),
            data_dir
        );
        Ok(registry)
    }

    /// Mint a fresh workspace with an empty root directory.
    pub async fn register_new_workspace(&mut self) -> Result<WorkspaceId> {
        let id = loop {
            let candidate = WorkspaceId::generate();
            if !self.workspaces.contains_key(&candidate) {
                break candidate;
            }
        };

        let root = self.data_dir.join(id.as_str());
        fs::create_dir_all(&root)
            .await
            .map_err(|source| RegistryError::DataDir {
                path: root.clone(),
                source,
            })?;

        info!("Registered new workspace {}", short(&id));
        self.workspaces.insert(id.clone(), Workspace::new(root));
        Ok(id)
    }

    pub fn contains(&self, id: &WorkspaceId) -> bool {
        self.workspaces.contains_key(id)
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    fn get(&self, id: &WorkspaceId) -> Result<&Workspace> {
        self.workspaces
            .get(id)
            .ok_or_else(|| RegistryError::UnknownWorkspace(id.clone()))
    }

    fn get_mut(&mut self, id: &WorkspaceId) -> Result<&mut Workspace> {
        self.workspaces
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownWorkspace(id.clone()))
    }

    /// The tree of a workspace.
    pub fn fs(&self, id: &WorkspaceId) -> Result<&NativeFs> {
        Ok(&self.get(id)?.fs)
    }

    /// Register `address` as an observer, creating its empty queue.
    pub fn observe(&mut self, id: &WorkspaceId, address: SocketAddr) -> Result<()> {
        self.get_mut(id)?.queues.entry(address).or_default();
        Ok(())
    }

    /// Apply `op` to the workspace tree, then queue it for every other observer.
    ///
    /// Returns the number of queues the operation was appended to. If the
    /// tree rejects the operation nothing is queued.
    pub async fn apply_and_broadcast(
        &mut self,
        id: &WorkspaceId,
        source: SocketAddr,
        op: &Operation,
    ) -> Result<usize> {
        let workspace = self.get_mut(id)?;
        relay_core::apply_operation(&workspace.fs, op).await?;

        let frame: Frame = Arc::from(op.encode());
        let mut recipients = 0;
        for (address, queue) in workspace.queues.iter_mut() {
            if *address == source {
                continue;
            }
            queue.push_back(Arc::clone(&frame));
            recipients += 1;
        }

        debug!(
            "Applied {} {} from {}, queued for {} observer(s)",
            op.kind(),
            op.path(),
            source,
            recipients
        );
        Ok(recipients)
    }

    /// Empty and return the queue of `address`, registering it if new.
    pub fn drain(&mut self, id: &WorkspaceId, address: SocketAddr) -> Result<Vec<Frame>> {
        let queue = self.get_mut(id)?.queues.entry(address).or_default();
        Ok(queue.drain(..).collect())
    }

    /// List the workspace tree for a full pull.
    pub async fn snapshot(&self, id: &WorkspaceId) -> Result<Vec<SnapshotEntry>> {
        let workspace = self.get(id)?;
        Ok(relay_core::snapshot(&workspace.fs).await?)
    }

    /// Read one file of a workspace tree.
    pub async fn read(&self, id: &WorkspaceId, path: &str) -> Result<Vec<u8>> {
        Ok(self.get(id)?.fs.read(path).await?)
    }

    /// Drop every queue held for `address`.
    ///
    /// Returns how many workspaces the address was observing.
    pub fn evict(&mut self, address: SocketAddr) -> usize {
        self.workspaces
            .values_mut()
            .filter_map(|w| w.queues.remove(&address))
            .count()
    }

    /// Number of frames waiting for `address`, `None` if it is not observing.
    pub fn pending(&self, id: &WorkspaceId, address: SocketAddr) -> Option<usize> {
        self.workspaces
            .get(id)?
            .queues
            .get(&address)
            .map(VecDeque::len)
    }
}

/// Abbreviated identifier for log lines.
pub fn short(id: &WorkspaceId) -> &str {
    &id.as_str()[..8]
}
