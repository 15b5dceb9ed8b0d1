//! Wire protocol
//!
//! JSON-object text messages over a persistent, bidirectional,
//! message-oriented connection. Every message carries an `action` field;
//! the remaining fields depend on the action. Snapshots travel inside
//! `state_update`; instance identity is carried inside the snapshot payload
//! itself, never out-of-band.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::slot::Resolution;

/// Every action name the protocol defines, used to distinguish an unknown
/// action from a known action with bad parameters.
pub const KNOWN_ACTIONS: &[&str] = &[
    "request_state",
    "state_update",
    "set_source",
    "set_lock",
    "set_lock_global",
    "refresh_sources",
    "save_configuration",
    "recall_configuration",
    "register_client",
    "source_changed",
    "configuration_saved",
    "configuration_recalled",
    "ping",
    "pong",
    "error",
];

/// Client role declared via `register_client`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Browser/controller; always receives pushes
    Controller,
    /// Info-only observer; receives pushes only when auto-update is on
    Info,
}

/// Self-reported state of one router instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Instance identifier. Absent on legacy single-instance payloads,
    /// which the broker forwards raw instead of merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub machine_id: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub local_sources: Vec<String>,
    pub output_names: Vec<String>,
    pub current_sources: Vec<String>,
    pub regex_patterns: Vec<String>,
    pub effective_regex_patterns: Vec<String>,
    pub output_resolutions: Vec<Resolution>,
    #[serde(default)]
    pub output_locks: Vec<bool>,
    #[serde(default)]
    pub global_lock: bool,
    #[serde(default = "default_true")]
    pub plural_handling_enabled: bool,
    #[serde(default)]
    pub last_update: f64,
}

fn default_true() -> bool {
    true
}

/// One instance's span inside the merged view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub id: String,
    pub name: String,
    pub machine_id: String,
    pub output_start_index: usize,
    pub output_count: usize,
    pub global_lock: bool,
    pub local_sources: Vec<String>,
}

/// Aggregate of every registered instance's snapshot.
///
/// Slot arrays are concatenations in registration order; `components`
/// records each instance's span so a client can route a slot index back to
/// its owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedState {
    pub sources: Vec<String>,
    pub output_names: Vec<String>,
    pub current_sources: Vec<String>,
    pub regex_patterns: Vec<String>,
    pub effective_regex_patterns: Vec<String>,
    pub output_resolutions: Vec<Resolution>,
    pub output_locks: Vec<bool>,
    pub global_lock: bool,
    pub components: Vec<ComponentInfo>,
    pub last_update: f64,
}

impl MergedState {
    /// Typed resolution lookup by output name (first match in merged order)
    pub fn output_resolution(&self, output_name: &str) -> Option<Resolution> {
        self.output_names
            .iter()
            .position(|n| n == output_name)
            .and_then(|i| self.output_resolutions.get(i).copied())
    }

    /// The component owning a merged slot index
    pub fn component_for_output(&self, output_index: usize) -> Option<&ComponentInfo> {
        self.components.iter().find(|c| {
            output_index >= c.output_start_index
                && output_index < c.output_start_index + c.output_count
        })
    }
}

/// Payload of a `state_update`: a single instance's snapshot on the way in,
/// the merged view on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatePayload {
    Merged(MergedState),
    Snapshot(StateSnapshot),
}

impl StatePayload {
    pub fn component_id(&self) -> Option<&str> {
        match self {
            StatePayload::Snapshot(s) => s.component_id.as_deref(),
            StatePayload::Merged(_) => None,
        }
    }
}

/// Protocol message, tagged by its `action` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Message {
    RequestState,

    StateUpdate {
        state: StatePayload,
    },

    SetSource {
        block_idx: usize,
        source_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    SetLock {
        block_idx: usize,
        locked: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    SetLockGlobal {
        locked: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    RefreshSources {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    SaveConfiguration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    RecallConfiguration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    RegisterClient {
        client_type: ClientRole,
        #[serde(default)]
        auto_update: bool,
    },

    SourceChanged {
        block_idx: usize,
        source_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },

    ConfigurationSaved {
        state: StateSnapshot,
        message: String,
    },

    ConfigurationRecalled {
        state: StateSnapshot,
        message: String,
    },

    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    Error {
        message: String,
    },
}

impl Message {
    /// The wire name of this message's action
    pub fn action(&self) -> &'static str {
        match self {
            Message::RequestState => "request_state",
            Message::StateUpdate { .. } => "state_update",
            Message::SetSource { .. } => "set_source",
            Message::SetLock { .. } => "set_lock",
            Message::SetLockGlobal { .. } => "set_lock_global",
            Message::RefreshSources { .. } => "refresh_sources",
            Message::SaveConfiguration { .. } => "save_configuration",
            Message::RecallConfiguration { .. } => "recall_configuration",
            Message::RegisterClient { .. } => "register_client",
            Message::SourceChanged { .. } => "source_changed",
            Message::ConfigurationSaved { .. } => "configuration_saved",
            Message::ConfigurationRecalled { .. } => "configuration_recalled",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Error { .. } => "error",
        }
    }

    /// For commands routable to an instance: the target identifier, if any
    pub fn component_id(&self) -> Option<&str> {
        match self {
            Message::SetSource { component_id, .. }
            | Message::SetLock { component_id, .. }
            | Message::SetLockGlobal { component_id, .. }
            | Message::RefreshSources { component_id, .. }
            | Message::SaveConfiguration { component_id, .. }
            | Message::RecallConfiguration { component_id, .. }
            | Message::SourceChanged { component_id, .. } => component_id.as_deref(),
            _ => None,
        }
    }

    /// Whether this action is a command the broker routes to instances
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Message::SetSource { .. }
                | Message::SetLock { .. }
                | Message::SetLockGlobal { .. }
                | Message::RefreshSources { .. }
                | Message::SaveConfiguration { .. }
                | Message::RecallConfiguration { .. }
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::Error {
            message: message.into(),
        }
    }
}

/// Decode one wire message, classifying failures per the error taxonomy
pub fn decode(text: &str) -> Result<Message> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::Malformed(e.to_string()))?;

    let action = match value.get("action").and_then(serde_json::Value::as_str) {
        Some(action) => action.to_string(),
        None => return Err(Error::Malformed("missing action field".to_string())),
    };

    match serde_json::from_value::<Message>(value) {
        Ok(message) => Ok(message),
        Err(e) => {
            if KNOWN_ACTIONS.contains(&action.as_str()) {
                Err(Error::InvalidParameters {
                    action,
                    detail: e.to_string(),
                })
            } else {
                Err(Error::UnknownAction(action))
            }
        }
    }
}

/// Encode one wire message as JSON text
pub fn encode(message: &Message) -> Result<String> {
    serde_json::to_string(message).map_err(|e| Error::Encode(e.to_string()))
}

/// Unix time in seconds, the protocol's `last_update` convention
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tag_round_trip() {
        let msg = Message::SetSource {
            block_idx: 2,
            source_name: "Camera)".to_string(),
            component_id: Some("A".to_string()),
        };
        let text = encode(&msg).unwrap();
        assert!(text.contains("\"action\":\"set_source\""));
        assert_eq!(decode(&text).unwrap(), msg);
    }

    #[test]
    fn test_decode_classification() {
        assert!(matches!(decode("not json"), Err(Error::Malformed(_))));
        assert!(matches!(decode("{\"foo\":1}"), Err(Error::Malformed(_))));
        assert!(matches!(
            decode("{\"action\":\"warp_core\"}"),
            Err(Error::UnknownAction(a)) if a == "warp_core"
        ));
        assert!(matches!(
            decode("{\"action\":\"set_source\",\"block_idx\":0}"),
            Err(Error::InvalidParameters { action, .. }) if action == "set_source"
        ));
    }

    #[test]
    fn test_optional_fields_default() {
        let msg = decode("{\"action\":\"ping\"}").unwrap();
        assert_eq!(msg, Message::Ping { timestamp: None });

        let msg = decode("{\"action\":\"refresh_sources\"}").unwrap();
        assert_eq!(msg.component_id(), None);

        let msg =
            decode("{\"action\":\"register_client\",\"client_type\":\"info\"}").unwrap();
        assert_eq!(
            msg,
            Message::RegisterClient {
                client_type: ClientRole::Info,
                auto_update: false,
            }
        );
    }

    #[test]
    fn test_legacy_snapshot_without_identity() {
        let text = "{\"action\":\"state_update\",\"state\":{\
            \"sources\":[\"Camera)\"],\
            \"output_names\":[\"Wide\"],\
            \"current_sources\":[\"Camera)\"],\
            \"regex_patterns\":[\"camera\"],\
            \"effective_regex_patterns\":[\"cameras?\\\\)?\"],\
            \"output_resolutions\":[[1920,1080]],\
            \"last_update\":1.0}}";
        let msg = decode(text).unwrap();
        match msg {
            Message::StateUpdate { state } => {
                assert_eq!(state.component_id(), None);
                match state {
                    StatePayload::Snapshot(s) => {
                        assert!(s.plural_handling_enabled);
                        assert!(s.output_locks.is_empty());
                    }
                    StatePayload::Merged(_) => panic!("parsed as merged state"),
                }
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_merged_payload_distinguished_from_snapshot() {
        let merged = MergedState {
            sources: vec!["Camera)".to_string()],
            output_names: vec!["Wide".to_string()],
            current_sources: vec!["Camera)".to_string()],
            regex_patterns: vec!["camera".to_string()],
            effective_regex_patterns: vec!["cameras?\\)?".to_string()],
            output_resolutions: vec![Resolution::new(1920, 1080)],
            output_locks: vec![false],
            global_lock: false,
            components: vec![ComponentInfo {
                id: "A".to_string(),
                name: "A".to_string(),
                machine_id: "m1".to_string(),
                output_start_index: 0,
                output_count: 1,
                global_lock: false,
                local_sources: vec![],
            }],
            last_update: 1.0,
        };
        let msg = Message::StateUpdate {
            state: StatePayload::Merged(merged.clone()),
        };
        let text = encode(&msg).unwrap();
        match decode(&text).unwrap() {
            Message::StateUpdate {
                state: StatePayload::Merged(m),
            } => assert_eq!(m, merged),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_merged_lookups() {
        let merged = MergedState {
            output_names: vec!["Wide".to_string(), "Tight".to_string()],
            output_resolutions: vec![Resolution::new(1920, 1080), Resolution::new(1280, 720)],
            components: vec![ComponentInfo {
                id: "A".to_string(),
                name: "A".to_string(),
                machine_id: "m1".to_string(),
                output_start_index: 0,
                output_count: 2,
                global_lock: false,
                local_sources: vec![],
            }],
            ..Default::default()
        };
        assert_eq!(
            merged.output_resolution("Tight"),
            Some(Resolution::new(1280, 720))
        );
        assert_eq!(merged.output_resolution("Missing"), None);
        assert_eq!(merged.component_for_output(1).map(|c| c.id.as_str()), Some("A"));
        assert!(merged.component_for_output(2).is_none());
    }
}
