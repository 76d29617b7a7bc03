//! Test utilities shared by the transport and client tests.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::broker::{DeliveryPolicy, EventBus};
use crate::config::Settings;
use crate::transport::serve;

/// Start a server on an ephemeral local port. Returns its `ws://` URL and
/// the bus behind it.
pub async fn start_server(settings: Settings) -> (String, Arc<EventBus>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let bus = Arc::new(EventBus::with_policy(DeliveryPolicy::from(&settings.broker)));

    tokio::spawn(serve(listener, bus.clone(), settings));
    (format!("ws://{addr}"), bus)
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
