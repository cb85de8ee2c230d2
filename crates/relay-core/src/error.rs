//! Error types for Relay Core

use thiserror::Error;

/// Result type alias using Relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Relay error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Backend not connected")]
    NotConnected,

    #[error("Failed to spawn backend '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to backend: {0}")]
    Write(#[source] std::io::Error),

    #[error("Connection closed while connecting")]
    Closed,

    #[error("No event dispatcher attached to this client")]
    NoDispatcher,

    #[error("Protocol error: {0}")]
    Protocol(#[from] relay_protocol::ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
