//! The relay broker
//!
//! One lightweight task per connection; all of them share the [`Registry`]
//! behind a single coarse lock. Merge computation and recipient capture
//! happen under one lock acquisition, so a broadcast never references an
//! instance that is mid-removal. Fan-out sends are fire-and-forget: a full
//! or dead peer queue gets the peer pruned, never the broadcast aborted.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use patchbay_core::{decode, encode, unix_now, Message, StatePayload};
use patchbay_transport::{
    TransportEvent, TransportReceiver, TransportSender, TransportServer, WebSocketServer,
};

use crate::error::Result;
use crate::registry::{ClientMeta, Connection, ConnectionId, Registry};

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Relay name, for logs
    pub name: String,
    /// Maximum simultaneous connections (0 = unlimited)
    pub max_connections: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "Patchbay Relay".to_string(),
            max_connections: 1000,
        }
    }
}

/// The Patchbay relay broker
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<RwLock<Registry>>,
    running: Arc<RwLock<bool>>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(RwLock::new(Registry::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Serve using any TransportServer implementation
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        info!("{} accepting connections", self.config.name);
        *self.running.write() = true;

        while *self.running.read() {
            match server.accept().await {
                Ok((sender, receiver, addr)) => {
                    if self.config.max_connections > 0
                        && self.registry.read().connection_count() >= self.config.max_connections
                    {
                        warn!("Connection limit reached, refusing {}", addr);
                        let _ = sender.close().await;
                        continue;
                    }
                    info!("New connection from {}", addr);
                    self.handle_connection(Arc::new(sender), receiver, addr);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Start the broker on WebSocket
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr).await?;
        self.serve_on(server).await
    }

    /// Stop the serve loop
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Current merged view (for tools and tests)
    pub fn merged_state(&self) -> patchbay_core::MergedState {
        self.registry.read().merged()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.read().connection_count()
    }

    pub fn instance_count(&self) -> usize {
        self.registry.read().instance_count()
    }

    /// Spawn the handler task for one accepted connection
    fn handle_connection(
        &self,
        sender: Arc<dyn TransportSender>,
        mut receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) {
        let connection_id: ConnectionId = Uuid::new_v4().to_string();
        self.registry
            .write()
            .add(Connection::new(connection_id.clone(), addr, sender.clone()));

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            while *running.read() {
                match receiver.recv().await {
                    Some(TransportEvent::Message(text)) => {
                        handle_text(&connection_id, &sender, &registry, text).await;
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        info!("Connection {} closed: {:?}", addr, reason);
                        break;
                    }
                    Some(TransportEvent::Error(e)) => {
                        error!("Transport error from {}: {}", addr, e);
                        break;
                    }
                    Some(TransportEvent::Connected) => {}
                    None => break,
                }
            }

            // Retract everything this connection contributed before the
            // next merge can run.
            registry.write().remove(&connection_id);
            debug!("Connection {} removed from registry", addr);
        });
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

/// Reply on the sender's own connection; failures end up closing it anyway
async fn reply(sender: &Arc<dyn TransportSender>, message: &Message) {
    match encode(message) {
        Ok(text) => {
            if let Err(e) = sender.send(text).await {
                debug!("Reply failed: {}", e);
            }
        }
        Err(e) => error!("Encode error on reply: {}", e),
    }
}

/// Fire-and-forget fan-out. Peers whose queue is full or closed are pruned
/// from the registry; delivery to the rest is unaffected.
fn fan_out(
    registry: &Arc<RwLock<Registry>>,
    targets: Vec<(ConnectionId, Arc<dyn TransportSender>)>,
    text: &str,
) {
    let mut pruned = Vec::new();
    for (connection_id, sender) in targets {
        if let Err(e) = sender.try_send(text.to_string()) {
            warn!("Pruning unreachable peer {}: {}", connection_id, e);
            pruned.push(connection_id);
        }
    }
    if !pruned.is_empty() {
        let mut reg = registry.write();
        for connection_id in pruned {
            reg.remove(&connection_id);
        }
    }
}

/// Handle one inbound text message
async fn handle_text(
    connection_id: &str,
    sender: &Arc<dyn TransportSender>,
    registry: &Arc<RwLock<Registry>>,
    text: String,
) {
    let message = match decode(&text) {
        Ok(message) => message,
        Err(e) => {
            // All decode failures are recoverable: reply and stay open.
            debug!("Bad message from {}: {}", connection_id, e);
            reply(sender, &Message::error(e.to_string())).await;
            return;
        }
    };

    match message {
        Message::RequestState => {
            // Always answered directly, regardless of role or auto-update.
            let merged = registry.read().merged();
            reply(
                sender,
                &Message::StateUpdate {
                    state: StatePayload::Merged(merged),
                },
            )
            .await;
        }

        Message::StateUpdate { state } => match state {
            StatePayload::Snapshot(snapshot) if snapshot.component_id.is_some() => {
                // Store, re-merge, and push; recipients are captured under
                // the same lock as the merge.
                let (merged, targets) = {
                    let mut reg = registry.write();
                    reg.apply_snapshot(connection_id, snapshot);
                    (reg.merged(), reg.push_targets(connection_id))
                };
                match encode(&Message::StateUpdate {
                    state: StatePayload::Merged(merged),
                }) {
                    Ok(out) => fan_out(registry, targets, &out),
                    Err(e) => error!("Encode error on merged state: {}", e),
                }
            }
            _ => {
                // No identifier: cannot be merged. Forward the raw message
                // verbatim to everyone else (legacy single-instance
                // fallback).
                debug!("Unidentified state_update from {}, forwarding raw", connection_id);
                let targets = registry.read().all_targets(connection_id);
                fan_out(registry, targets, &text);
            }
        },

        Message::RegisterClient {
            client_type,
            auto_update,
        } => {
            debug!(
                "Connection {} registered as {:?} (auto_update: {})",
                connection_id, client_type, auto_update
            );
            registry.write().set_meta(
                connection_id,
                ClientMeta {
                    role: client_type,
                    auto_update,
                },
            );
        }

        ref msg @ (Message::SetSource { .. }
        | Message::SetLock { .. }
        | Message::SetLockGlobal { .. }
        | Message::RefreshSources { .. }
        | Message::SaveConfiguration { .. }
        | Message::RecallConfiguration { .. }) => {
            match msg.component_id() {
                Some(target) => {
                    // Addressed: exactly one instance, or an error to the
                    // sender naming the missing id.
                    let found = registry.read().instance_sender(target);
                    match found {
                        Some((target_conn, target_sender)) => {
                            if let Err(e) = target_sender.try_send(text.clone()) {
                                warn!("Pruning unreachable instance {}: {}", target, e);
                                registry.write().remove(&target_conn);
                                reply(
                                    sender,
                                    &Message::error(format!("unknown component: {target}")),
                                )
                                .await;
                            }
                        }
                        None => {
                            reply(
                                sender,
                                &Message::error(format!("unknown component: {target}")),
                            )
                            .await;
                        }
                    }
                }
                None => {
                    let targets = registry.read().command_targets(connection_id);
                    fan_out(registry, targets, &text);
                }
            }
        }

        Message::SourceChanged { .. }
        | Message::ConfigurationSaved { .. }
        | Message::ConfigurationRecalled { .. } => {
            // Instance-side notifications, relayed to everyone who takes
            // pushes.
            let targets = registry.read().push_targets(connection_id);
            fan_out(registry, targets, &text);
        }

        Message::Ping { .. } => {
            reply(
                sender,
                &Message::Pong {
                    timestamp: Some(unix_now()),
                },
            )
            .await;
        }

        Message::Pong { .. } => {}

        Message::Error { message } => {
            // Never re-forwarded: error echoes must not loop.
            warn!("Peer {} reported error: {}", connection_id, message);
        }
    }
}
