//! Patchbay Relay Server
//!
//! The central relay: router instances publish their state here, browsers
//! and info clients read the merged view and issue commands.
//!
//! ```bash
//! # Default (WebSocket on port 8080)
//! patchbay-relay
//!
//! # Custom bind
//! patchbay-relay --host 0.0.0.0 --port 9000 --name "Stage Relay"
//! ```

use anyhow::Result;
use clap::Parser;
use patchbay_broker::{Broker, BrokerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchbay-relay")]
#[command(about = "Patchbay Relay Server")]
#[command(version)]
struct Cli {
    /// Listen port
    #[arg(short, long, default_value_t = patchbay_core::DEFAULT_PORT)]
    port: u16,

    /// Listen host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Relay name (shown in logs)
    #[arg(short, long, default_value = "Patchbay Relay")]
    name: String,

    /// Maximum simultaneous connections (0 = unlimited)
    #[arg(long, default_value = "1000")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
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

    let addr = format!("{}:{}", cli.host, cli.port);
    tracing::info!("Starting {}", cli.name);
    tracing::info!("WebSocket: ws://{}", addr);
    tracing::info!("Max connections: {}", cli.max_connections);

    let broker = Broker::new(BrokerConfig {
        name: cli.name,
        max_connections: cli.max_connections,
    });

    broker.serve_websocket(&addr).await?;

    Ok(())
}
