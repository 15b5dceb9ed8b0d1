//! Transport trait definitions
//!
//! The protocol rides on any persistent, bidirectional connection carrying
//! discrete text messages. These traits are that boundary; WebSocket is the
//! shipped implementation.

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::error::Result;

/// Events that can occur on a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// One discrete text message received
    Message(String),
    /// Error occurred
    Error(String),
}

/// Trait for sending text messages
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send a message, waiting for outbound queue space
    async fn send(&self, text: String) -> Result<()>;

    /// Send without waiting; fails fast when the peer's outbound queue is
    /// full so a stalled peer cannot hold up a broadcast loop
    fn try_send(&self, text: String) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the sender
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving transport events
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event; `None` when the connection task has ended
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Client-side transport: dial a remote endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

/// Server-side transport: accept connections
#[async_trait]
pub trait TransportServer: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    /// Accept a new connection
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Close the server
    async fn close(&self) -> Result<()>;
}
