//! The `error` module defines the error types used within `buschat`.
//!
//! `ChatError` is what the session and controller surface to callers,
//! `TransportError` is raised by `Transport` implementations and
//! `PersistenceError` by the relay's retained-message store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// The transport could not establish the connection. Fatal to the session.
    #[error("failed to connect to the broker: {0}")]
    Connection(#[source] TransportError),
    /// An inbound chat payload could not be decoded.
    #[error("malformed chat payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    /// Rejected at the boundary, before any connection is attempted.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("session is not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection refused by broker: {0}")]
    Refused(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("retained store error: {0}")]
    Sled(#[from] sled::Error),
    #[error("corrupt retained entry: {0}")]
    Decode(#[from] serde_json::Error),
}
