//! Patchbay Broker
//!
//! The broker is the central relay of a Patchbay deployment:
//! - Accepts connections from router instances and clients
//! - Merges each instance's published snapshot into one coherent view
//! - Fans out state updates selectively by client role
//! - Routes addressed commands to exactly the right instance
//!
//! # Example
//!
//! ```no_run
//! use patchbay_broker::{Broker, BrokerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Broker::new(BrokerConfig::default());
//!     broker.serve_websocket("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod error;
pub mod registry;

pub use broker::{Broker, BrokerConfig};
pub use error::{BrokerError, Result};
pub use registry::{ClientMeta, Connection, ConnectionId, Registry};
