//! # chatsub
//!
//! `chatsub` is an in-memory, topic-based chat broker. Clients talk to it over
//! WebSockets: `send` publishes a line to a topic, `receive` opens a stream of
//! every event on a topic. Each broker action advances a single Lamport-style
//! logical clock, and every delivered event carries its stamp.
//!
//! ## Core Modules
//!
//! - `broker`: the event bus, topics, subscriber endpoints and the logical clock.
//! - `session`: one streaming receive session, from join to leave.
//! - `transport`: the WebSocket server, wire messages and request gateway.
//! - `client`: a client library for the wire protocol, used by the CLI.
//! - `config`: loading server configuration from file and environment.
//! - `utils`: shared error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub mod test_utils;
