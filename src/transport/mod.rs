//! The `transport` module is responsible for network communication with
//! chat clients over WebSockets.
//!
//! It defines the JSON protocol spoken between clients and the server, the
//! gateway that turns requests into event bus calls, and the WebSocket
//! server that accepts connections.

pub mod gateway;
pub mod message;
pub mod websocket;

pub use gateway::Gateway;
pub use message::{ClientMessage, ServerMessage};
pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod tests;
