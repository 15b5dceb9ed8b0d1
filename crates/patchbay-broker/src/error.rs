//! Broker error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(#[from] patchbay_transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] patchbay_core::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
