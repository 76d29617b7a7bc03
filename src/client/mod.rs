//! The `client` module is the chat user's side of the protocol.
//!
//! It connects to the server, publishes lines with `send` and reads the
//! stamped event stream opened with `receive`. The CLI's `client`
//! subcommand is built on it.

pub mod chat_client;

pub use chat_client::{ChatConnection, ReceiveStream, ReceivedMessage, connect};
