//! Common test helpers for Patchbay tests
//!
//! Provides:
//! - Port allocation
//! - Condition-based waiting (no hardcoded sleeps for correctness)
//! - A broker fixture that serves on a random local port
//! - A wire-level test connection speaking the JSON protocol

use std::sync::Arc;
use std::time::{Duration, Instant};

use patchbay_broker::{Broker, BrokerConfig};
use patchbay_core::{decode, encode, Message};
use patchbay_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, WebSocketReceiver,
    WebSocketSender, WebSocketTransport,
};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F>(mut check: F, max_wait: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
    }
    false
}

/// A broker serving on a random local port for the duration of a test
pub struct TestBroker {
    addr: String,
    broker: Arc<Broker>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestBroker {
    pub async fn start() -> Self {
        Self::start_with_config(BrokerConfig::default()).await
    }

    pub async fn start_with_config(config: BrokerConfig) -> Self {
        let port = find_available_port().await;
        let addr = format!("127.0.0.1:{port}");
        let broker = Arc::new(Broker::new(config));

        let handle = {
            let broker = Arc::clone(&broker);
            let addr = addr.clone();
            tokio::spawn(async move {
                let _ = broker.serve_websocket(&addr).await;
            })
        };

        // Wait until the listener actually accepts.
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            if tokio::net::TcpStream::connect(&addr).await.is_ok() {
                break;
            }
            assert!(Instant::now() < deadline, "broker did not start on {addr}");
            tokio::time::sleep(DEFAULT_CHECK_INTERVAL).await;
        }

        Self {
            addr,
            broker,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Open a wire-level connection to this broker
    pub async fn connect(&self) -> TestConn {
        TestConn::connect(&self.url()).await
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.broker.stop();
        self.handle.abort();
    }
}

/// A raw protocol connection for driving the broker from tests
pub struct TestConn {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

impl TestConn {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::connect(url)
            .await
            .expect("test connection should connect");
        Self { sender, receiver }
    }

    pub async fn send(&self, message: &Message) {
        let text = encode(message).expect("test message should encode");
        self.sender.send(text).await.expect("test send should succeed");
    }

    pub async fn send_raw(&self, text: &str) {
        self.sender
            .send(text.to_string())
            .await
            .expect("test send should succeed");
    }

    /// Next protocol message within the timeout, if any
    pub async fn recv_message(&mut self, max_wait: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let event = tokio::time::timeout_at(deadline, self.receiver.recv())
                .await
                .ok()??;
            match event {
                TransportEvent::Message(text) => {
                    return Some(decode(&text).expect("peer sent undecodable message"));
                }
                TransportEvent::Disconnected { .. } => return None,
                _ => {}
            }
        }
    }

    /// Drain messages until one carries the wanted action; panics on timeout
    pub async fn expect_action(&mut self, action: &str) -> Message {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let remaining = deadline - tokio::time::Instant::now();
            match self.recv_message(remaining.max(Duration::ZERO)).await {
                Some(message) if message.action() == action => return message,
                Some(_) => {}
                None => panic!("timed out waiting for action {action}"),
            }
        }
    }

    /// Assert that no protocol message arrives within the window
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Some(message) = self.recv_message(window).await {
            panic!("expected silence, got {}", message.action());
        }
    }

    pub async fn close(&self) {
        let _ = self.sender.close().await;
    }
}
