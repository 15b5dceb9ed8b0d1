//! Patchbay Transport
//!
//! Transport layer for Patchbay: trait definitions plus the WebSocket
//! implementation. The protocol only assumes a persistent, bidirectional,
//! message-oriented connection carrying discrete text messages, so
//! alternative transports slot in behind [`TransportServer`] /
//! [`Transport`].

pub mod error;
pub mod traits;
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};
pub use websocket::{WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport};
