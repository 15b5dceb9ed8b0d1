//! Connection registry and snapshot merge
//!
//! The registry is the broker's single piece of shared mutable state:
//! connection table, per-instance snapshots, and instance registration
//! order. Callers serialize every read and write through one lock, so a
//! merge computed here can never observe a half-removed instance.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use patchbay_core::{unix_now, ClientRole, ComponentInfo, MergedState, StateSnapshot};
use patchbay_transport::TransportSender;

/// Registry key for one connection
pub type ConnectionId = String;

/// Role metadata for one connection.
///
/// Connections that never register are controllers: browsers predate the
/// `register_client` action and always receive pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMeta {
    pub role: ClientRole,
    pub auto_update: bool,
}

impl Default for ClientMeta {
    fn default() -> Self {
        Self {
            role: ClientRole::Controller,
            auto_update: true,
        }
    }
}

/// One connected peer
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub meta: ClientMeta,
    /// Bound once the connection's first identified snapshot arrives
    pub instance_id: Option<String>,
    sender: Arc<dyn TransportSender>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: Arc<dyn TransportSender>) -> Self {
        Self {
            id,
            addr,
            meta: ClientMeta::default(),
            instance_id: None,
            sender,
        }
    }

    pub fn sender(&self) -> Arc<dyn TransportSender> {
        Arc::clone(&self.sender)
    }

    fn receives_pushes(&self) -> bool {
        self.meta.role == ClientRole::Controller || self.meta.auto_update
    }
}

/// The broker's registry of connections, instances, and snapshots
#[derive(Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    snapshots: HashMap<String, StateSnapshot>,
    /// Instance ids in first-registration order; merge concatenation order
    order: Vec<String>,
    /// Instance id -> connection currently publishing it
    instances: HashMap<String, ConnectionId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, connection: Connection) {
        self.connections.insert(connection.id.clone(), connection);
    }

    /// Remove a connection and, atomically, every registry entry derived
    /// from it. After this returns no merge can reference the instance the
    /// connection was publishing.
    pub fn remove(&mut self, connection_id: &str) -> Option<Connection> {
        let connection = self.connections.remove(connection_id)?;
        if let Some(instance_id) = &connection.instance_id {
            // Only unbind if this connection still owns the id; a restarted
            // instance may have re-bound it from a newer connection.
            if self.instances.get(instance_id).map(String::as_str) == Some(connection_id) {
                self.instances.remove(instance_id);
                self.snapshots.remove(instance_id);
                self.order.retain(|id| id != instance_id);
            }
        }
        Some(connection)
    }

    pub fn set_meta(&mut self, connection_id: &str, meta: ClientMeta) {
        if let Some(connection) = self.connections.get_mut(connection_id) {
            connection.meta = meta;
        }
    }

    /// Store an identified snapshot, binding the connection to its instance
    /// id on first sight. Returns false if the connection is unknown or the
    /// snapshot carries no identifier.
    pub fn apply_snapshot(&mut self, connection_id: &str, snapshot: StateSnapshot) -> bool {
        let Some(instance_id) = snapshot.component_id.clone() else {
            return false;
        };
        let Some(connection) = self.connections.get_mut(connection_id) else {
            return false;
        };
        connection.instance_id = Some(instance_id.clone());
        if !self.instances.contains_key(&instance_id) {
            self.order.push(instance_id.clone());
        }
        self.instances
            .insert(instance_id.clone(), connection_id.to_string());
        self.snapshots.insert(instance_id, snapshot);
        true
    }

    /// Aggregate every registered snapshot in registration order
    pub fn merged(&self) -> MergedState {
        let mut merged = MergedState::default();
        for id in &self.order {
            let Some(snapshot) = self.snapshots.get(id) else {
                continue;
            };
            let start = merged.output_names.len();
            merged
                .output_names
                .extend(snapshot.output_names.iter().cloned());
            merged
                .current_sources
                .extend(snapshot.current_sources.iter().cloned());
            merged
                .regex_patterns
                .extend(snapshot.regex_patterns.iter().cloned());
            merged
                .effective_regex_patterns
                .extend(snapshot.effective_regex_patterns.iter().cloned());
            merged
                .output_resolutions
                .extend(snapshot.output_resolutions.iter().copied());
            merged
                .output_locks
                .extend(snapshot.output_locks.iter().copied());
            // Union of source names, first-seen order
            for source in &snapshot.sources {
                if !merged.sources.contains(source) {
                    merged.sources.push(source.clone());
                }
            }
            merged.global_lock |= snapshot.global_lock;
            merged.components.push(ComponentInfo {
                id: id.clone(),
                name: snapshot.name.clone(),
                machine_id: snapshot.machine_id.clone(),
                output_start_index: start,
                output_count: snapshot.output_names.len(),
                global_lock: snapshot.global_lock,
                local_sources: snapshot.local_sources.clone(),
            });
        }
        merged.last_update = unix_now();
        merged
    }

    /// Sender for the connection currently publishing an instance id
    pub fn instance_sender(
        &self,
        instance_id: &str,
    ) -> Option<(ConnectionId, Arc<dyn TransportSender>)> {
        let connection_id = self.instances.get(instance_id)?;
        let connection = self.connections.get(connection_id)?;
        Some((connection_id.clone(), connection.sender()))
    }

    /// Connections that receive unsolicited pushes (merged-state updates
    /// and notifications), excluding the sender
    pub fn push_targets(&self, exclude: &str) -> Vec<(ConnectionId, Arc<dyn TransportSender>)> {
        self.connections
            .values()
            .filter(|c| c.id != exclude && c.receives_pushes())
            .map(|c| (c.id.clone(), c.sender()))
            .collect()
    }

    /// Recipients of an unaddressed command: every instance connection and
    /// every controller client, excluding the sender
    pub fn command_targets(&self, exclude: &str) -> Vec<(ConnectionId, Arc<dyn TransportSender>)> {
        self.connections
            .values()
            .filter(|c| {
                c.id != exclude
                    && (c.instance_id.is_some() || c.meta.role == ClientRole::Controller)
            })
            .map(|c| (c.id.clone(), c.sender()))
            .collect()
    }

    /// Everyone except the sender (legacy raw-forward fallback)
    pub fn all_targets(&self, exclude: &str) -> Vec<(ConnectionId, Arc<dyn TransportSender>)> {
        self.connections
            .values()
            .filter(|c| c.id != exclude)
            .map(|c| (c.id.clone(), c.sender()))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn instance_count(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use patchbay_core::Resolution;
    use patchbay_transport::{Result as TransportResult, TransportError};

    /// Sender that records everything pushed at it
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TransportSender for RecordingSender {
        async fn send(&self, text: String) -> TransportResult<()> {
            self.try_send(text)
        }

        fn try_send(&self, text: String) -> TransportResult<()> {
            if self.fail {
                return Err(TransportError::ConnectionClosed);
            }
            self.sent.lock().push(text);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            !self.fail
        }

        async fn close(&self) -> TransportResult<()> {
            Ok(())
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    fn connect(registry: &mut Registry, id: &str) -> Arc<RecordingSender> {
        let sender = Arc::new(RecordingSender::default());
        registry.add(Connection::new(id.to_string(), addr(), sender.clone()));
        sender
    }

    fn snapshot(id: &str, outputs: &[&str], sources: &[&str]) -> StateSnapshot {
        StateSnapshot {
            component_id: Some(id.to_string()),
            name: id.to_string(),
            machine_id: format!("machine-{id}"),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            local_sources: vec![],
            output_names: outputs.iter().map(|s| s.to_string()).collect(),
            current_sources: vec![String::new(); outputs.len()],
            regex_patterns: vec![String::new(); outputs.len()],
            effective_regex_patterns: vec!["\\)?".to_string(); outputs.len()],
            output_resolutions: vec![Resolution::new(1920, 1080); outputs.len()],
            output_locks: vec![false; outputs.len()],
            global_lock: false,
            plural_handling_enabled: true,
            last_update: 0.0,
        }
    }

    #[test]
    fn test_merge_two_instances() {
        let mut registry = Registry::new();
        connect(&mut registry, "conn-a");
        connect(&mut registry, "conn-b");

        registry.apply_snapshot("conn-a", snapshot("A", &["Wide", "Tight"], &["Camera)"]));
        registry.apply_snapshot(
            "conn-b",
            snapshot("B", &["Confidence"], &["Camera)", "Projector)"]),
        );

        let merged = registry.merged();
        assert_eq!(merged.output_names, vec!["Wide", "Tight", "Confidence"]);
        assert_eq!(merged.sources, vec!["Camera)", "Projector)"]);
        assert_eq!(merged.components.len(), 2);
        assert_eq!(merged.components[0].id, "A");
        assert_eq!(merged.components[0].output_start_index, 0);
        assert_eq!(merged.components[0].output_count, 2);
        assert_eq!(merged.components[1].id, "B");
        assert_eq!(merged.components[1].output_start_index, 2);
        assert_eq!(merged.components[1].output_count, 1);
    }

    #[test]
    fn test_merge_global_lock_is_or() {
        let mut registry = Registry::new();
        connect(&mut registry, "conn-a");
        connect(&mut registry, "conn-b");

        let mut locked = snapshot("A", &["Wide"], &[]);
        locked.global_lock = true;
        registry.apply_snapshot("conn-a", locked);
        registry.apply_snapshot("conn-b", snapshot("B", &["Tight"], &[]));

        assert!(registry.merged().global_lock);
        assert!(registry.merged().components[0].global_lock);
        assert!(!registry.merged().components[1].global_lock);
    }

    #[test]
    fn test_resend_keeps_registration_order() {
        let mut registry = Registry::new();
        connect(&mut registry, "conn-a");
        connect(&mut registry, "conn-b");

        registry.apply_snapshot("conn-a", snapshot("A", &["Wide"], &[]));
        registry.apply_snapshot("conn-b", snapshot("B", &["Confidence"], &[]));
        // A publishes again; its span must stay first.
        registry.apply_snapshot("conn-a", snapshot("A", &["Wide", "Tight"], &[]));

        let merged = registry.merged();
        assert_eq!(merged.components[0].id, "A");
        assert_eq!(merged.components[1].output_start_index, 2);
    }

    #[test]
    fn test_remove_retracts_instance_atomically() {
        let mut registry = Registry::new();
        connect(&mut registry, "conn-a");
        connect(&mut registry, "conn-b");
        registry.apply_snapshot("conn-a", snapshot("A", &["Wide"], &["Camera)"]));
        registry.apply_snapshot("conn-b", snapshot("B", &["Confidence"], &["Projector)"]));

        registry.remove("conn-a");

        assert!(registry.instance_sender("A").is_none());
        let merged = registry.merged();
        assert_eq!(merged.components.len(), 1);
        assert_eq!(merged.components[0].id, "B");
        assert_eq!(merged.components[0].output_start_index, 0);
        assert_eq!(merged.sources, vec!["Projector)"]);
    }

    #[test]
    fn test_rebound_instance_survives_old_connection_removal() {
        let mut registry = Registry::new();
        connect(&mut registry, "conn-old");
        connect(&mut registry, "conn-new");
        registry.apply_snapshot("conn-old", snapshot("A", &["Wide"], &[]));
        // Instance restarts on a new connection before the old one is
        // reaped.
        registry.apply_snapshot("conn-new", snapshot("A", &["Wide"], &[]));

        registry.remove("conn-old");

        assert_eq!(registry.instance_count(), 1);
        let (connection_id, _) = registry.instance_sender("A").unwrap();
        assert_eq!(connection_id, "conn-new");
    }

    #[test]
    fn test_push_targets_respect_roles() {
        let mut registry = Registry::new();
        connect(&mut registry, "sender");
        connect(&mut registry, "browser");
        connect(&mut registry, "observer");
        connect(&mut registry, "ticker");
        registry.set_meta(
            "observer",
            ClientMeta {
                role: ClientRole::Info,
                auto_update: false,
            },
        );
        registry.set_meta(
            "ticker",
            ClientMeta {
                role: ClientRole::Info,
                auto_update: true,
            },
        );

        let mut ids: Vec<_> = registry
            .push_targets("sender")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["browser", "ticker"]);
    }

    #[test]
    fn test_command_targets_are_instances_and_controllers() {
        let mut registry = Registry::new();
        connect(&mut registry, "sender");
        connect(&mut registry, "browser");
        connect(&mut registry, "instance");
        connect(&mut registry, "observer");
        registry.apply_snapshot("instance", snapshot("A", &["Wide"], &[]));
        registry.set_meta(
            "observer",
            ClientMeta {
                role: ClientRole::Info,
                auto_update: true,
            },
        );

        let mut ids: Vec<_> = registry
            .command_targets("sender")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["browser", "instance"]);
    }
}
