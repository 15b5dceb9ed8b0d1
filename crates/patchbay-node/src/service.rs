//! Node service
//!
//! Connects a [`RouterInstance`] to a broker: publishes an identified
//! snapshot on connect and after every state change, serves commands
//! addressed to the instance (or unaddressed), and drains the discovery
//! feed. Runs until the connection drops; reconnection policy belongs to
//! the caller.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use patchbay_core::{decode, encode, unix_now, Message, StatePayload};
use patchbay_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, WebSocketTransport,
};

use crate::error::Result;
use crate::events::SourceEvent;
use crate::instance::RouterInstance;
use crate::persist::ConfigStore;

pub struct NodeService {
    instance: RouterInstance,
    store: Box<dyn ConfigStore>,
}

impl NodeService {
    pub fn new(instance: RouterInstance, store: Box<dyn ConfigStore>) -> Self {
        Self { instance, store }
    }

    pub fn instance(&self) -> &RouterInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut RouterInstance {
        &mut self.instance
    }

    /// Connect to the relay and serve until the connection closes
    pub async fn run(
        &mut self,
        relay_url: &str,
        events: &mut mpsc::Receiver<SourceEvent>,
    ) -> Result<()> {
        let (sender, mut receiver) = WebSocketTransport::connect(relay_url).await?;
        info!(
            "Instance {} connected to relay {}",
            self.instance.id(),
            relay_url
        );

        // Initial state announces the instance's identity to the broker.
        self.publish(&sender).await?;

        let mut events_open = true;
        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(TransportEvent::Message(text)) => {
                        self.handle_text(&sender, &text).await?;
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        info!("Relay connection closed: {:?}", reason);
                        return Ok(());
                    }
                    Some(TransportEvent::Error(e)) => {
                        warn!("Transport error: {}", e);
                    }
                    Some(TransportEvent::Connected) => {}
                    None => return Ok(()),
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_discovery(&sender, event).await?,
                    None => events_open = false,
                },
            }
        }
    }

    async fn handle_discovery(
        &mut self,
        sender: &impl TransportSender,
        event: SourceEvent,
    ) -> Result<()> {
        match event {
            SourceEvent::Appeared { names, scope } => {
                self.instance.on_sources_appeared(&names, scope);
            }
            SourceEvent::Disappeared { names } => {
                self.instance.on_sources_disappeared(&names);
            }
        }
        // The directory changed even when no slot did; peers get the
        // refreshed snapshot either way.
        self.publish(sender).await
    }

    async fn handle_text(&mut self, sender: &impl TransportSender, text: &str) -> Result<()> {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Bad message: {}", e);
                return self.send(sender, &Message::error(e.to_string())).await;
            }
        };

        // Commands addressed to another instance are not ours to act on.
        if let Some(target) = message.component_id() {
            if target != self.instance.id() {
                return Ok(());
            }
        }

        match message {
            Message::SetSource {
                block_idx,
                source_name,
                ..
            } => match self.instance.set_source(block_idx, &source_name) {
                Ok(()) => {
                    self.send(
                        sender,
                        &Message::SourceChanged {
                            block_idx,
                            source_name,
                            component_id: Some(self.instance.id().to_string()),
                        },
                    )
                    .await?;
                    self.publish(sender).await?;
                }
                Err(e) => {
                    self.send(sender, &Message::error(e.to_string())).await?;
                }
            },

            Message::SetLock {
                block_idx, locked, ..
            } => match self.instance.set_lock(block_idx, locked) {
                Ok(()) => self.publish(sender).await?,
                Err(e) => self.send(sender, &Message::error(e.to_string())).await?,
            },

            Message::SetLockGlobal { locked, .. } => {
                self.instance.set_global_lock(locked);
                self.publish(sender).await?;
            }

            Message::RefreshSources { .. } => {
                self.instance.refresh();
                self.publish(sender).await?;
            }

            Message::SaveConfiguration { .. } => {
                match self.instance.save_configuration(self.store.as_mut()) {
                    Ok(()) => {
                        self.send(
                            sender,
                            &Message::ConfigurationSaved {
                                state: self.instance.snapshot(),
                                message: "configuration saved".to_string(),
                            },
                        )
                        .await?;
                    }
                    Err(e) => self.send(sender, &Message::error(e.to_string())).await?,
                }
            }

            Message::RecallConfiguration { .. } => {
                match self.instance.recall_configuration(self.store.as_ref()) {
                    Ok(()) => {
                        self.send(
                            sender,
                            &Message::ConfigurationRecalled {
                                state: self.instance.snapshot(),
                                message: "configuration recalled".to_string(),
                            },
                        )
                        .await?;
                        self.publish(sender).await?;
                    }
                    Err(e) => self.send(sender, &Message::error(e.to_string())).await?,
                }
            }

            Message::RequestState => {
                // Served for directly-attached clients; the broker answers
                // this itself with the merged view.
                self.publish(sender).await?;
            }

            Message::Ping { .. } => {
                self.send(
                    sender,
                    &Message::Pong {
                        timestamp: Some(unix_now()),
                    },
                )
                .await?;
            }

            Message::Error { message } => {
                warn!("Relay reported error: {}", message);
            }

            // Merged pushes and peer notifications carry nothing a full
            // instance acts on.
            Message::StateUpdate { .. }
            | Message::SourceChanged { .. }
            | Message::ConfigurationSaved { .. }
            | Message::ConfigurationRecalled { .. }
            | Message::RegisterClient { .. }
            | Message::Pong { .. } => {}
        }

        Ok(())
    }

    async fn publish(&self, sender: &impl TransportSender) -> Result<()> {
        self.send(
            sender,
            &Message::StateUpdate {
                state: StatePayload::Snapshot(self.instance.snapshot()),
            },
        )
        .await
    }

    async fn send(&self, sender: &impl TransportSender, message: &Message) -> Result<()> {
        let text = encode(message)?;
        sender.send(text).await?;
        Ok(())
    }
}
