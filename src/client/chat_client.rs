//! Chat client
//!
//! Thin wrapper over a WebSocket connection speaking the gateway protocol.
//! A `ChatConnection` issues `send` requests and waits for their ack; calling
//! `receive` consumes it and turns it into a `ReceiveStream` of stamped
//! messages, mirroring how the server treats a receive request as terminal.

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::LamportTimestamp;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::ChatError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One event as seen by a receiving client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub lamport_timestamp: LamportTimestamp,
    pub text: String,
    pub topic: String,
}

impl fmt::Display for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lamport timestamp: {} | {}", self.lamport_timestamp, self.text)
    }
}

pub struct ChatConnection {
    socket: Socket,
}

impl fmt::Debug for ChatConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConnection")
            .field("socket", &"WebSocketStream")
            .finish()
    }
}

/// Open a connection to the server at `url` (e.g. `ws://127.0.0.1:8080`).
pub async fn connect(url: &str) -> Result<ChatConnection, ChatError> {
    let (socket, _response) = connect_async(url)
        .await
        .map_err(|source| ChatError::Connect {
            url: url.to_string(),
            source,
        })?;
    debug!(url, "connected");
    Ok(ChatConnection { socket })
}

impl ChatConnection {
    /// Publish one line and wait for the server's acknowledgement flag.
    pub async fn send(&mut self, author: &str, topic: &str, message: &str) -> Result<String, ChatError> {
        let request = ClientMessage::Send {
            author: author.to_string(),
            topic: topic.to_string(),
            message: message.to_string(),
        };
        self.write(&request).await?;

        loop {
            match read_server_message(&mut self.socket).await? {
                Some(ServerMessage::Ack { flag }) => return Ok(flag),
                Some(ServerMessage::Error { message }) => return Err(ChatError::Server(message)),
                Some(ServerMessage::Message { .. }) => continue,
                None => return Err(ChatError::ConnectionClosed),
            }
        }
    }

    /// Open a receive stream for `topic`. The connection can no longer send.
    pub async fn receive(mut self, author: &str, topic: &str) -> Result<ReceiveStream, ChatError> {
        let request = ClientMessage::Receive {
            author: author.to_string(),
            topic: topic.to_string(),
        };
        self.write(&request).await?;
        Ok(ReceiveStream {
            socket: self.socket,
        })
    }

    async fn write(&mut self, request: &ClientMessage) -> Result<(), ChatError> {
        let text = serde_json::to_string(request)?;
        self.socket.send(WsMessage::text(text)).await?;
        Ok(())
    }
}

pub struct ReceiveStream {
    socket: Socket,
}

impl fmt::Debug for ReceiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveStream")
            .field("socket", &"WebSocketStream")
            .finish()
    }
}

impl ReceiveStream {
    /// Next stamped message, or `None` once the server closed the stream.
    pub async fn next_message(&mut self) -> Result<Option<ReceivedMessage>, ChatError> {
        loop {
            match read_server_message(&mut self.socket).await? {
                Some(ServerMessage::Message {
                    text,
                    lamport_timestamp,
                    topic,
                }) => {
                    return Ok(Some(ReceivedMessage {
                        lamport_timestamp,
                        text,
                        topic,
                    }));
                }
                Some(ServerMessage::Error { message }) => return Err(ChatError::Server(message)),
                Some(ServerMessage::Ack { .. }) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Close the stream; the server runs its leave cleanup.
    pub async fn close(mut self) -> Result<(), ChatError> {
        self.socket.close(None).await?;
        Ok(())
    }
}

async fn read_server_message(socket: &mut Socket) -> Result<Option<ServerMessage>, ChatError> {
    while let Some(frame) = socket.next().await {
        match frame? {
            WsMessage::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
            WsMessage::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}
