use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Event, EventBus, Payload};
use crate::transport::gateway::Gateway;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::websocket::ACCEPT_BACKOFF;

fn frames_from(values: Vec<serde_json::Value>) -> Vec<Result<WsMessage, tungstenite::Error>> {
    values
        .into_iter()
        .map(|v| Ok(WsMessage::text(v.to_string())))
        .collect()
}

fn decode(frame: &WsMessage) -> ServerMessage {
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

#[test]
fn test_parse_send_request() {
    let msg = json!({
        "type": "send",
        "author": "Anders",
        "topic": "itu",
        "message": "hello"
    })
    .to_string();

    let parsed: ClientMessage = serde_json::from_str(&msg).unwrap();
    assert_eq!(
        parsed,
        ClientMessage::Send {
            author: "Anders".to_string(),
            topic: "itu".to_string(),
            message: "hello".to_string(),
        }
    );
    assert!(parsed.validate().is_ok());
}

#[test]
fn test_parse_receive_request() {
    let msg = json!({ "type": "receive", "author": "Emil", "topic": "itu" }).to_string();
    let parsed: ClientMessage = serde_json::from_str(&msg).unwrap();
    assert_eq!(
        parsed,
        ClientMessage::Receive {
            author: "Emil".to_string(),
            topic: "itu".to_string(),
        }
    );
}

#[test]
fn test_validate_rejects_blank_fields() {
    let no_author = ClientMessage::Receive {
        author: "  ".to_string(),
        topic: "itu".to_string(),
    };
    assert_eq!(
        no_author.validate().unwrap_err().to_string(),
        "malformed request: author must not be empty"
    );

    let no_topic = ClientMessage::Send {
        author: "Anders".to_string(),
        topic: String::new(),
        message: "hi".to_string(),
    };
    assert_eq!(
        no_topic.validate().unwrap_err().to_string(),
        "malformed request: topic must not be empty"
    );
}

#[test]
fn test_server_message_wire_format() {
    let event = Event::new("itu", Payload::chat("Anders", "hello")).stamped(8);
    let value = serde_json::to_value(ServerMessage::from(&event)).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "message",
            "text": "Anders: hello",
            "lamport_timestamp": 8,
            "topic": "itu"
        })
    );

    let ack = serde_json::to_value(ServerMessage::ack()).unwrap();
    assert_eq!(ack, json!({ "type": "ack", "flag": "OK" }));
}

#[tokio::test]
async fn test_gateway_send_publishes_chat() {
    let bus = Arc::new(EventBus::new());
    let gateway = Gateway::new(bus.clone());
    let (ep, mut mailbox) = bus.endpoint();
    bus.subscribe("itu", ep);

    assert_eq!(gateway.send("Anders", "itu", "hello"), 3);

    let event = tokio::time::timeout(Duration::from_secs(2), mailbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.payload, Payload::chat("Anders", "hello"));
    assert_eq!(event.lamport_timestamp, 3);
}

#[tokio::test]
async fn test_serve_connection_acks_and_reports_errors() {
    let bus = Arc::new(EventBus::new());
    let gateway = Gateway::new(bus.clone());

    let mut inbound = frames_from(vec![
        json!({ "type": "shout", "topic": "itu" }),
        json!({ "type": "send", "author": "", "topic": "itu", "message": "x" }),
        json!({ "type": "send", "author": "Anders", "topic": "itu", "message": "hi" }),
    ]);
    inbound.push(Ok(WsMessage::Close(None)));
    let peer = futures::stream::iter(inbound);

    let (out_tx, out_rx) = mpsc::unbounded::<WsMessage>();
    let sink = out_tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed);

    gateway.serve_connection(sink, peer, "conn-test").await;

    let replies: Vec<ServerMessage> = out_rx.map(|f| decode(&f)).collect().await;
    assert_eq!(replies.len(), 3);
    assert!(matches!(replies[0], ServerMessage::Error { .. }));
    assert_eq!(
        replies[1],
        ServerMessage::error("malformed request: author must not be empty")
    );
    assert_eq!(replies[2], ServerMessage::ack());
    // Only the valid send reached the bus.
    assert_eq!(bus.clock(), 2);
}

#[tokio::test]
async fn test_serve_connection_receive_is_terminal() {
    let bus = Arc::new(EventBus::new());
    let gateway = Gateway::new(bus.clone());

    let (in_tx, in_rx) = mpsc::unbounded::<Result<WsMessage, tungstenite::Error>>();
    let (out_tx, mut out_rx) = mpsc::unbounded::<WsMessage>();
    let sink = out_tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed);

    let server = tokio::spawn(async move { gateway.serve_connection(sink, in_rx, "conn-test").await });

    in_tx
        .unbounded_send(Ok(WsMessage::text(
            json!({ "type": "receive", "author": "Emil", "topic": "itu" }).to_string(),
        )))
        .unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(2), out_rx.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        decode(&joined),
        ServerMessage::Message {
            text: "Emil joined".to_string(),
            lamport_timestamp: 3,
            topic: "itu".to_string(),
        }
    );

    drop(in_tx);
    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bus.subscriber_count("itu"), 0);
    assert_eq!(bus.clock(), 6);
}

#[test]
fn test_accept_errors_back_off_briefly() {
    assert!(ACCEPT_BACKOFF > Duration::ZERO);
    assert!(ACCEPT_BACKOFF <= Duration::from_secs(1));
}
