//! The `error` module defines the error types used within `chatsub`.
//!
//! Broker operations themselves cannot fail; these errors come from the
//! edges: configuration, sockets, the WebSocket protocol and malformed
//! requests.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("failed to encode or decode message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("server replied with error: {0}")]
    Server(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
