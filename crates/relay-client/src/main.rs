//! relay-client: Keeps a local directory in sync with a relay workspace.

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::{NativeFs, ProtocolError, WorkspaceId};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_client::{ChangeEmitter, FileWatcher, ServerLink, SyncClient, DEFAULT_TRANSIENT_PATTERN};

#[derive(Parser, Debug)]
#[command(name = "relay-client")]
#[command(about = "Directory relay sync client")]
struct Args {
    /// Relay server host
    #[arg(short, long)]
    server: String,

    /// Relay server port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Local directory to mirror (created if missing)
    #[arg(short, long)]
    root: PathBuf,

    /// Seconds between polls for remote changes
    #[arg(short, long, default_value_t = 5)]
    interval: u64,

    /// Join an existing workspace instead of creating one.
    /// The local directory is replaced by the workspace contents.
    #[arg(short, long)]
    workspace: Option<String>,

    /// Substring marking editor temporary files (repeatable)
    #[arg(long = "transient-pattern", default_value = DEFAULT_TRANSIENT_PATTERN)]
    transient_patterns: Vec<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,relay_client=debug,relay_core=debug"
    } else {
        "info,relay_client=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let workspace = args
        .workspace
        .as_deref()
        .map(str::parse::<WorkspaceId>)
        .transpose()
        .context("Invalid workspace id")?;

    tokio::fs::create_dir_all(&args.root)
        .await
        .with_context(|| format!("Failed to create {:?}", args.root))?;
    let root = args.root.canonicalize()?;
    info!("Local root: {:?}", root);

    let address = format!("{}:{}", args.server, args.port);
    let mut link = ServerLink::connect(&address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;
    info!("Connected to {}", address);

    let fs = NativeFs::new(root.clone());
    let emitter = ChangeEmitter::new(args.transient_patterns);
    let joining = workspace.is_some();
    let workspace = relay_client::reconcile(&mut link, &fs, workspace, &emitter).await?;

    if !joining {
        // The id is the only way to join this workspace from another machine
        println!("Workspace: {}", workspace);
    }
    info!("Synchronizing workspace {}", &workspace.as_str()[..8]);

    let watcher = FileWatcher::new(root)?;
    let mut client = SyncClient::new(link, fs, workspace, emitter, watcher);

    let mut poll = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    poll.tick().await;

    info!("Client running. Press Ctrl+C to stop.");

    let result: Result<()> = loop {
        tokio::select! {
            Some(event) = client.watcher.event_rx().recv() => {
                if let Err(e) = client.on_file_event(event).await {
                    break Err(e);
                }
            }

            _ = poll.tick() => {
                if let Err(e) = client.poll().await {
                    break Err(e);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break Ok(());
            }
        }
    };

    if let Err(e) = &result {
        if matches!(e.downcast_ref::<ProtocolError>(), Some(ProtocolError::Disconnected)) {
            error!("Server closed the connection; restart to resynchronize");
        } else {
            error!("Sync stopped: {:#}", e);
        }
    }
    result
}
