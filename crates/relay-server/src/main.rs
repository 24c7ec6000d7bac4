//! relay-server: Hosts workspaces and relays tree changes between clients.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::{RelayServer, WorkspaceRegistry};

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Directory relay sync server")]
struct Args {
    /// Address to listen on for client connections
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Directory holding one subdirectory per workspace
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,relay_server=debug,relay_core=debug"
    } else {
        "info,relay_server=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting relay-server");
    info!("Data directory: {:?}", args.data_dir);

    let registry = WorkspaceRegistry::load(args.data_dir).await?;
    let mut server = RelayServer::new(registry);
    let listener = RelayServer::bind(&args.listen).await?;

    info!("Server running. Press Ctrl+C to stop.");

    tokio::select! {
        result = server.run(&listener) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!(
        "Shutting down with {} open connection(s)",
        server.connection_count()
    );
    Ok(())
}
