//! Patchbay Node Runner
//!
//! Runs one router instance against a relay. The discovery feed is read
//! from stdin as a line-oriented host adapter, one event per line:
//!
//! ```text
//! add Camera)        # network-qualified source appeared
//! add-local preview  # host-local source appeared
//! remove Camera)     # source disappeared
//! ```
//!
//! Real deployments replace the stdin adapter with whatever discovery
//! mechanism the host actually has; the service only sees SourceEvents.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use patchbay_core::SourceScope;
use patchbay_node::{
    ConfigStore, JsonFileStore, MemoryStore, NodeConfig, NodeService, RouterInstance, SourceEvent,
};

#[derive(Parser)]
#[command(name = "patchbay-node")]
#[command(about = "Patchbay Router Instance")]
#[command(version)]
struct Cli {
    /// Node configuration file (JSON)
    #[arg(short, long, default_value = "node.json")]
    config: PathBuf,

    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    relay: String,

    /// Directory for saved configurations (in-memory when omitted)
    #[arg(short, long)]
    store_dir: Option<PathBuf>,

    /// Exit after the first disconnect instead of reconnecting
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Translate stdin lines into discovery events
async fn read_host_feed(tx: mpsc::Sender<SourceEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event = match line.split_once(' ') {
            Some(("add", name)) => Some(SourceEvent::Appeared {
                names: vec![name.to_string()],
                scope: SourceScope::Qualified,
            }),
            Some(("add-local", name)) => Some(SourceEvent::Appeared {
                names: vec![name.to_string()],
                scope: SourceScope::Local,
            }),
            Some(("remove", name)) => Some(SourceEvent::Disappeared {
                names: vec![name.to_string()],
            }),
            _ => {
                tracing::warn!("Unrecognized feed line: {}", line);
                None
            }
        };
        if let Some(event) = event {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::from_file(&cli.config)?;
    tracing::info!("Instance {} ({} outputs)", config.id, config.outputs.len());
    tracing::info!("Relay: {}", cli.relay);

    let store: Box<dyn ConfigStore> = match &cli.store_dir {
        Some(dir) => {
            tracing::info!("Saved configurations in {}", dir.display());
            Box::new(JsonFileStore::new(dir))
        }
        None => Box::new(MemoryStore::new()),
    };

    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(read_host_feed(tx));

    let mut service = NodeService::new(RouterInstance::new(config), store);

    loop {
        match service.run(&cli.relay, &mut rx).await {
            Ok(()) => tracing::info!("Disconnected from relay"),
            Err(e) => tracing::warn!("Relay session failed: {}", e),
        }
        if cli.once {
            break;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        tracing::info!("Reconnecting to {}", cli.relay);
    }

    Ok(())
}
