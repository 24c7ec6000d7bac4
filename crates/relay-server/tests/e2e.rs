//! End-to-end tests for relay-server.
//!
//! Runs a real server on a loopback port and drives it through the client
//! library and raw sockets.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use relay_client::{ChangeEmitter, ServerLink, reconcile};
use relay_core::protocol::tag;
use relay_core::{FileSystem, NativeFs, Node, Operation, Request, WorkspaceId};
use relay_server::{RelayServer, WorkspaceRegistry};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

/// Start a server on a random port.
async fn start_server(data_dir: &Path) -> (SocketAddr, JoinHandle<()>) {
    let registry = WorkspaceRegistry::load(data_dir.to_path_buf())
        .await
        .expect("Failed to load registry");
    let mut server = RelayServer::new(registry);
    let listener = RelayServer::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handle = tokio::spawn(async move {
        let _ = server.run(&listener).await;
    });
    (addr, handle)
}

async fn connect(addr: SocketAddr) -> ServerLink<TcpStream> {
    timeout(STEP, ServerLink::connect(&addr.to_string()))
        .await
        .expect("Timed out connecting")
        .expect("Failed to connect")
}

fn hello() -> Operation {
    Operation::Create {
        path: "a/b.txt".into(),
        node: Node::File(b"hello".to_vec()),
    }
}

/// Every entry under `root`: files map to their contents, directories to `None`.
fn tree(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Option<Vec<u8>>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_dir() {
                out.insert(rel, None);
                walk(root, &path, out);
            } else {
                out.insert(rel, Some(std::fs::read(&path).unwrap()));
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

// ============================================================================
// Protocol scenarios
// ============================================================================

#[tokio::test]
async fn test_push_then_pull_from_second_client() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut first = connect(addr).await;
    let id = timeout(STEP, first.request_workspace())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id.as_str().len(), 128);
    assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));

    let echoed = timeout(STEP, first.push(&id, hello())).await.unwrap().unwrap();
    assert!(echoed.is_empty(), "a client never receives its own push");

    let mut second = connect(addr).await;
    timeout(STEP, second.start_pull(&id)).await.unwrap().unwrap();
    let item = second.next_snapshot_item().await.unwrap();
    assert_eq!(item, Some(hello()));
    assert_eq!(second.next_snapshot_item().await.unwrap(), None);
    assert!(second.read_updates().await.unwrap().is_empty());

    let stored = std::fs::read(data.path().join(id.as_str()).join("a").join("b.txt")).unwrap();
    assert_eq!(stored, b"hello");
}

#[tokio::test]
async fn test_fan_out_in_order_without_self_echo() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut source = connect(addr).await;
    let id = source.request_workspace().await.unwrap();

    let mut observers = Vec::new();
    for _ in 0..3 {
        let mut link = connect(addr).await;
        assert!(link.updates(&id).await.unwrap().is_empty());
        observers.push(link);
    }

    let ops = vec![
        hello(),
        Operation::Modify {
            path: "a/b.txt".into(),
            data: b"world".to_vec(),
        },
        Operation::Move {
            from: "a/b.txt".into(),
            to: "c.txt".into(),
            is_dir: false,
        },
    ];
    for op in &ops {
        let echoed = timeout(STEP, source.push(&id, op.clone()))
            .await
            .unwrap()
            .unwrap();
        assert!(echoed.is_empty());
    }

    for link in &mut observers {
        let received = timeout(STEP, link.updates(&id)).await.unwrap().unwrap();
        assert_eq!(received, ops);
        // Delivered exactly once
        assert!(link.updates(&id).await.unwrap().is_empty());
    }
    assert!(source.updates(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_updates_ride_on_push_reply() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut a = connect(addr).await;
    let id = a.request_workspace().await.unwrap();
    let mut b = connect(addr).await;
    b.updates(&id).await.unwrap();

    a.push(&id, hello()).await.unwrap();

    let mkdir = Operation::Create {
        path: "from-b".into(),
        node: Node::Directory,
    };
    let delivered = timeout(STEP, b.push(&id, mkdir.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, vec![hello()]);

    let delivered = timeout(STEP, a.updates(&id)).await.unwrap().unwrap();
    assert_eq!(delivered, vec![mkdir]);
}

#[tokio::test]
async fn test_disconnect_leaves_other_queues_intact() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut a = connect(addr).await;
    let id = a.request_workspace().await.unwrap();
    let mut b = connect(addr).await;
    b.updates(&id).await.unwrap();

    {
        let mut quitter = connect(addr).await;
        quitter.updates(&id).await.unwrap();
    }

    a.push(&id, hello()).await.unwrap();
    let received = timeout(STEP, b.updates(&id)).await.unwrap().unwrap();
    assert_eq!(received, vec![hello()]);
}

#[tokio::test]
async fn test_truncated_request_only_drops_that_client() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut a = connect(addr).await;
    let id = a.request_workspace().await.unwrap();

    // Half a push, then hang up
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let frame = Request::push(id.clone(), hello()).encode();
    raw.write_all(&frame[..frame.len() / 2]).await.unwrap();
    drop(raw);

    let echoed = timeout(STEP, a.push(&id, hello())).await.unwrap().unwrap();
    assert!(echoed.is_empty());
}

#[tokio::test]
async fn test_unknown_workspace_gets_invalid_byte() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&Request::pull(WorkspaceId::generate()).encode())
        .await
        .unwrap();

    let mut reply = Vec::new();
    timeout(STEP, raw.read_to_end(&mut reply))
        .await
        .expect("Server should close the connection")
        .unwrap();
    assert_eq!(reply, vec![tag::INVALID]);
}

#[tokio::test]
async fn test_malformed_workspace_gets_invalid_byte() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let mut request = vec![1u8];
    request.extend_from_slice(&[b'-'; relay_core::WORKSPACE_ID_LEN]);
    request.push(tag::PULL);

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&request).await.unwrap();

    let mut reply = Vec::new();
    timeout(STEP, raw.read_to_end(&mut reply))
        .await
        .expect("Server should close the connection")
        .unwrap();
    assert_eq!(reply, vec![tag::INVALID]);
}

#[tokio::test]
async fn test_workspaces_survive_restart() {
    let data = TempDir::new().unwrap();
    let id = {
        let (addr, server) = start_server(data.path()).await;
        let mut link = connect(addr).await;
        let id = link.request_workspace().await.unwrap();
        link.push(&id, hello()).await.unwrap();
        server.abort();
        id
    };

    let (addr, _server) = start_server(data.path()).await;
    let mut link = connect(addr).await;
    link.start_pull(&id).await.unwrap();
    assert_eq!(link.next_snapshot_item().await.unwrap(), Some(hello()));
    assert_eq!(link.next_snapshot_item().await.unwrap(), None);
}

// ============================================================================
// Reconciler
// ============================================================================

#[tokio::test]
async fn test_reconciled_trees_match() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;
    let emitter = ChangeEmitter::default();

    let origin = TempDir::new().unwrap();
    let origin_fs = NativeFs::new(origin.path().to_path_buf());
    origin_fs.write("notes/today.md", b"# today").await.unwrap();
    origin_fs.write("notes/deep/er.txt", b"deeper").await.unwrap();
    origin_fs.write("top.bin", &[0, 159, 146, 150]).await.unwrap();
    origin_fs.mkdir("empty/nested").await.unwrap();

    let mut link = connect(addr).await;
    let id = timeout(STEP, reconcile(&mut link, &origin_fs, None, &emitter))
        .await
        .unwrap()
        .unwrap();

    let mirror = TempDir::new().unwrap();
    let mirror_fs = NativeFs::new(mirror.path().to_path_buf());
    mirror_fs.write("stale/local.txt", b"discarded").await.unwrap();

    let mut other = connect(addr).await;
    let joined = timeout(STEP, reconcile(&mut other, &mirror_fs, Some(id.clone()), &emitter))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(joined, id);

    assert_eq!(tree(mirror.path()), tree(origin.path()));
    assert_eq!(
        tree(&data.path().join(id.as_str())),
        tree(origin.path())
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_colon_names_round_trip() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;
    let emitter = ChangeEmitter::default();

    let origin = TempDir::new().unwrap();
    let origin_fs = NativeFs::new(origin.path().to_path_buf());
    origin_fs.write("notes/meeting 10:30.md", b"agenda").await.unwrap();

    let mut link = connect(addr).await;
    let id = timeout(STEP, reconcile(&mut link, &origin_fs, None, &emitter))
        .await
        .unwrap()
        .unwrap();

    let mirror = TempDir::new().unwrap();
    let mirror_fs = NativeFs::new(mirror.path().to_path_buf());
    let mut other = connect(addr).await;
    timeout(STEP, reconcile(&mut other, &mirror_fs, Some(id.clone()), &emitter))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tree(mirror.path()), tree(origin.path()));

    // A live rename onto a colon name keeps the connection usable
    let rename = Operation::Move {
        from: "notes/meeting 10:30.md".into(),
        to: "notes/meeting 11:00.md".into(),
        is_dir: false,
    };
    let echoed = timeout(STEP, link.push(&id, rename.clone()))
        .await
        .unwrap()
        .unwrap();
    assert!(echoed.is_empty());
    assert!(link.updates(&id).await.unwrap().is_empty());

    let received = timeout(STEP, other.updates(&id)).await.unwrap().unwrap();
    assert_eq!(received, vec![rename]);
    assert!(
        data.path()
            .join(id.as_str())
            .join("notes")
            .join("meeting 11:00.md")
            .exists()
    );
}

#[tokio::test]
async fn test_reconcile_unknown_workspace_fails() {
    let data = TempDir::new().unwrap();
    let (addr, _server) = start_server(data.path()).await;

    let local = TempDir::new().unwrap();
    let fs = NativeFs::new(local.path().to_path_buf());
    fs.write("mine.txt", b"keep").await.unwrap();

    let mut link = connect(addr).await;
    let result = timeout(
        STEP,
        reconcile(
            &mut link,
            &fs,
            Some(WorkspaceId::generate()),
            &ChangeEmitter::default(),
        ),
    )
    .await
    .unwrap();

    assert!(result.is_err());
    assert!(local.path().join("mine.txt").exists());
}
