//! Patchbay Node
//!
//! One router instance: the ordered output slots, the source directory,
//! lock state, and save/recall bookkeeping, plus the service that keeps an
//! instance connected to a relay.
//!
//! The instance itself ([`RouterInstance`]) is synchronous and IO-free.
//! Hosts feed it discovery events ([`SourceEvent`]) and persistence
//! ([`ConfigStore`]); [`NodeService`] is the standard wiring for both plus
//! the relay connection.

pub mod config;
pub mod error;
pub mod events;
pub mod instance;
pub mod persist;
pub mod service;

pub use config::{NodeConfig, SlotConfig};
pub use error::{NodeError, Result};
pub use events::SourceEvent;
pub use instance::RouterInstance;
pub use persist::{ConfigStore, JsonFileStore, MemoryStore, SavedSlot};
pub use service::NodeService;
