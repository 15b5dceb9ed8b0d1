//! Error types for Patchbay

use thiserror::Error;

/// Result type alias for Patchbay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Patchbay error types
#[derive(Error, Debug)]
pub enum Error {
    /// Message body was not a JSON object carrying an `action` string
    #[error("malformed message: {0}")]
    Malformed(String),

    /// `action` field named an action outside the protocol table
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Known action with missing or ill-typed fields
    #[error("invalid {action} parameters: {detail}")]
    InvalidParameters { action: String, detail: String },

    /// Addressed command named a component that is not registered
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Slot index outside the instance's output range
    #[error("block index {index} out of range ({count} outputs)")]
    BlockOutOfRange { index: usize, count: usize },

    /// Serialization failure on the outbound path
    #[error("encode error: {0}")]
    Encode(String),
}
