use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tungstenite::protocol::Message as WsMessage;

use super::{SessionEnd, StreamingSession};
use crate::broker::{DeliveryPolicy, EventBus, Payload};
use crate::transport::message::ServerMessage;

type Inbound = UnboundedSender<Result<WsMessage, tungstenite::Error>>;

/// The remote side of one session: what we push in, and what the session
/// wrote out.
struct Peer {
    inbound: Inbound,
    outbound: UnboundedReceiver<WsMessage>,
    session: JoinHandle<SessionEnd>,
}

fn open(bus: &Arc<EventBus>, author: &str, topic: &str) -> Peer {
    let (inbound, inbound_rx) = mpsc::unbounded();
    let (outbound_tx, outbound) = mpsc::unbounded::<WsMessage>();
    let sink = outbound_tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed);

    let session = tokio::spawn(StreamingSession::new(bus.clone(), author, topic).run(sink, inbound_rx));

    Peer {
        inbound,
        outbound,
        session,
    }
}

async fn next_text(outbound: &mut UnboundedReceiver<WsMessage>) -> (u64, String) {
    let frame = tokio::time::timeout(Duration::from_secs(2), outbound.next())
        .await
        .expect("timed out waiting for frame")
        .expect("session closed its sink");
    match serde_json::from_str::<ServerMessage>(frame.to_text().unwrap()).unwrap() {
        ServerMessage::Message {
            text,
            lamport_timestamp,
            ..
        } => (lamport_timestamp, text),
        other => panic!("Expected a message frame, got {other:?}"),
    }
}

async fn finished(session: JoinHandle<SessionEnd>) -> SessionEnd {
    tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .expect("session did not finish")
        .expect("session panicked")
}

#[tokio::test]
async fn test_session_sees_its_own_join() {
    let bus = Arc::new(EventBus::new());
    let mut a = open(&bus, "Anders", "itu");

    assert_eq!(next_text(&mut a.outbound).await, (3, "Anders joined".to_string()));
    assert_eq!(bus.subscriber_count("itu"), 1);
    assert_eq!(bus.clock(), 3);
}

#[tokio::test]
async fn test_sessions_follow_scenario_and_leave_once() {
    let bus = Arc::new(EventBus::new());
    let mut a = open(&bus, "A", "itu");
    assert_eq!(next_text(&mut a.outbound).await, (3, "A joined".to_string()));

    let mut b = open(&bus, "B", "itu");
    assert_eq!(next_text(&mut a.outbound).await, (6, "B joined".to_string()));
    assert_eq!(next_text(&mut b.outbound).await, (6, "B joined".to_string()));

    assert_eq!(bus.publish("itu", Payload::chat("A", "hello")), 8);
    assert_eq!(next_text(&mut a.outbound).await, (8, "A: hello".to_string()));
    assert_eq!(next_text(&mut b.outbound).await, (8, "A: hello".to_string()));

    // Dropping the inbound half is what a closed connection looks like.
    drop(b.inbound);
    assert_eq!(finished(b.session).await, SessionEnd::PeerClosed);

    assert_eq!(next_text(&mut a.outbound).await, (11, "B left".to_string()));
    assert_eq!(bus.subscriber_count("itu"), 1);
    // One unsubscribe and one two-tick publish.
    assert_eq!(bus.clock(), 11);
}

#[tokio::test]
async fn test_close_frame_ends_session() {
    let bus = Arc::new(EventBus::new());
    let mut a = open(&bus, "A", "itu");
    next_text(&mut a.outbound).await;

    a.inbound.unbounded_send(Ok(WsMessage::Close(None))).unwrap();
    assert_eq!(finished(a.session).await, SessionEnd::PeerClosed);
    assert_eq!(bus.subscriber_count("itu"), 0);
}

#[tokio::test]
async fn test_stream_error_runs_cleanup() {
    let bus = Arc::new(EventBus::new());
    let mut watcher = open(&bus, "W", "itu");
    next_text(&mut watcher.outbound).await;
    let mut a = open(&bus, "A", "itu");
    next_text(&mut a.outbound).await;
    next_text(&mut watcher.outbound).await;

    a.inbound
        .unbounded_send(Err(tungstenite::Error::ConnectionClosed))
        .unwrap();
    assert_eq!(finished(a.session).await, SessionEnd::PeerError);

    assert_eq!(next_text(&mut watcher.outbound).await.1, "A left");
    assert_eq!(bus.subscriber_count("itu"), 1);
}

#[tokio::test]
async fn test_forward_failure_runs_cleanup() {
    let bus = Arc::new(EventBus::new());
    let a = open(&bus, "A", "itu");
    drop(a.outbound);

    assert_eq!(finished(a.session).await, SessionEnd::ForwardFailed);
    assert_eq!(bus.subscriber_count("itu"), 0);
    // subscribe, join, unsubscribe, leave
    assert_eq!(bus.clock(), 6);
}

#[tokio::test]
async fn test_aborted_session_still_cleans_up() {
    let bus = Arc::new(EventBus::new());
    let mut watcher = open(&bus, "W", "itu");
    next_text(&mut watcher.outbound).await;
    let mut a = open(&bus, "A", "itu");
    next_text(&mut a.outbound).await;
    next_text(&mut watcher.outbound).await;

    a.session.abort();
    assert!(a.session.await.unwrap_err().is_cancelled());

    assert_eq!(next_text(&mut watcher.outbound).await.1, "A left");
    assert_eq!(bus.subscriber_count("itu"), 1);
}

#[tokio::test]
async fn test_inbound_frames_are_ignored() {
    let bus = Arc::new(EventBus::new());
    let mut a = open(&bus, "A", "itu");
    next_text(&mut a.outbound).await;

    a.inbound
        .unbounded_send(Ok(WsMessage::text("chatter")))
        .unwrap();
    bus.publish("itu", Payload::chat("B", "still here"));

    assert_eq!(next_text(&mut a.outbound).await.1, "B: still here");
    assert!(!a.session.is_finished());
}

#[tokio::test]
async fn test_stalled_peer_is_evicted() {
    let bus = Arc::new(EventBus::with_policy(DeliveryPolicy {
        endpoint_capacity: 1,
        delivery_timeout: Some(Duration::from_millis(20)),
    }));
    let mut watcher = open(&bus, "W", "itu");
    next_text(&mut watcher.outbound).await;

    // A peer that never reads: the bounded sink fills and stays full.
    let (_inbound, inbound_rx) = mpsc::unbounded::<Result<WsMessage, tungstenite::Error>>();
    let (outbound_tx, _outbound) = mpsc::channel::<WsMessage>(0);
    let sink = outbound_tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed);
    let session = tokio::spawn(StreamingSession::new(bus.clone(), "S", "itu").run(sink, inbound_rx));

    assert_eq!(next_text(&mut watcher.outbound).await.1, "S joined");

    // Keep the topic busy until the stalled session is evicted.
    let mut published = Vec::new();
    for i in 0..20 {
        if session.is_finished() {
            break;
        }
        let line = format!("W: {i}");
        let stamp = bus.publish("itu", Payload::chat("W", i.to_string()));
        published.push((stamp, line));
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    assert_eq!(finished(session).await, SessionEnd::Evicted);

    // The watcher sees every chat line plus one leave, in stamp order. The
    // leave is stamped whenever the eviction happened, so its position
    // among the chat lines is not fixed.
    let mut seen = Vec::new();
    for _ in 0..published.len() + 1 {
        seen.push(next_text(&mut watcher.outbound).await);
    }
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));

    let (left, chat): (Vec<_>, Vec<_>) = seen.into_iter().partition(|(_, text)| text == "S left");
    assert_eq!(left.len(), 1);
    assert_eq!(chat, published);
    assert_eq!(bus.subscriber_count("itu"), 1);
}
