//! Client Reconnection Integration Tests
//!
//! Exercises the multiplexer against a real gateway: forced disconnects,
//! subscription replay, and exactly-once delivery after reconnecting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use live_gateway::infrastructure::ws::GatewayState;
use live_gateway::{
    BroadcastDispatcher, ClientConfig, MatchStreamHub, ReconnectConfig, StreamSettings,
    TopicRegistry, UpdateMultiplexer, gateway_router, topics,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn spawn_gateway() -> (String, Arc<BroadcastDispatcher>) {
    let registry = Arc::new(TopicRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(registry));
    let state = GatewayState::new(
        Arc::clone(&dispatcher),
        Arc::new(MatchStreamHub::new(64)),
        StreamSettings::default(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, gateway_router(state)).await.unwrap();
    });

    (format!("127.0.0.1:{}", addr.port()), dispatcher)
}

fn fast_reconnect_config(addr: &str) -> ClientConfig {
    ClientConfig {
        reconnect: ReconnectConfig::flat(Duration::from_millis(50)),
        ..ClientConfig::new(format!("ws://{addr}/ws"))
    }
}

fn forwarding_handler(
    tx: mpsc::UnboundedSender<serde_json::Value>,
) -> impl Fn(&serde_json::Value) + Send + Sync {
    move |payload| {
        let _ = tx.send(payload.clone());
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn recv_payload(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("handler channel closed")
}

#[tokio::test]
async fn subscriptions_are_replayed_after_forced_disconnect() {
    let (addr, dispatcher) = spawn_gateway().await;
    let mux = UpdateMultiplexer::new(fast_reconnect_config(&addr));

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let _ha = mux.subscribe(topics::MATCH_SCORE, forwarding_handler(tx_a.clone()));
    let _hb = mux.subscribe(topics::ODDS_UPDATE, forwarding_handler(tx_b.clone()));

    wait_until("initial subscriptions", || dispatcher.stats().topics == 2).await;

    // Force-disconnect every session; the client reconnects after its
    // flat delay and replays both topics
    dispatcher.close_all();
    wait_until("registry emptied", || dispatcher.stats().topics == 0).await;
    wait_until("subscriptions replayed", || dispatcher.stats().topics == 2).await;

    dispatcher.publish(topics::MATCH_SCORE, json!({"home": 1, "away": 0}));
    dispatcher.publish(topics::ODDS_UPDATE, json!({"odds": 2.1}));

    assert_eq!(recv_payload(&mut rx_a).await, json!({"home": 1, "away": 0}));
    assert_eq!(recv_payload(&mut rx_b).await, json!({"odds": 2.1}));
}

#[tokio::test]
async fn post_reconnect_delivery_is_exactly_once() {
    let (addr, dispatcher) = spawn_gateway().await;
    let mux = UpdateMultiplexer::new(fast_reconnect_config(&addr));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = mux.subscribe(topics::BET_SETTLED, forwarding_handler(tx.clone()));
    wait_until("initial subscription", || dispatcher.stats().topics == 1).await;

    dispatcher.close_all();
    wait_until("registry emptied", || dispatcher.stats().topics == 0).await;
    wait_until("subscription replayed", || dispatcher.stats().topics == 1).await;

    dispatcher.publish(topics::BET_SETTLED, json!({"betId": "9"}));

    // Exactly once: no duplicate from a race between old and new transport
    assert_eq!(recv_payload(&mut rx).await, json!({"betId": "9"}));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err(), "handler must fire exactly once");
}

#[tokio::test]
async fn unsubscribed_topics_are_not_replayed() {
    let (addr, dispatcher) = spawn_gateway().await;
    let mux = UpdateMultiplexer::new(fast_reconnect_config(&addr));

    let (tx_a, _rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let ha = mux.subscribe(topics::MATCH_SCORE, forwarding_handler(tx_a.clone()));
    let _hb = mux.subscribe(topics::ODDS_UPDATE, forwarding_handler(tx_b.clone()));
    wait_until("initial subscriptions", || dispatcher.stats().topics == 2).await;

    // Drop one topic before the disconnect
    ha.unsubscribe();
    wait_until("unsubscribe propagated", || dispatcher.stats().topics == 1).await;

    dispatcher.close_all();
    wait_until("registry emptied", || dispatcher.stats().topics == 0).await;
    wait_until("subscription replayed", || dispatcher.stats().topics == 1).await;

    // Only the topic still desired came back
    assert_eq!(dispatcher.publish(topics::MATCH_SCORE, json!({})), 0);
    assert_eq!(dispatcher.publish(topics::ODDS_UPDATE, json!({"odds": 3.0})), 1);
    assert_eq!(recv_payload(&mut rx_b).await, json!({"odds": 3.0}));
}

#[tokio::test]
async fn teardown_cancels_reconnect_for_good() {
    let (addr, dispatcher) = spawn_gateway().await;
    let mux = UpdateMultiplexer::new(fast_reconnect_config(&addr));

    let (tx, _rx) = mpsc::unbounded_channel();
    let handle = mux.subscribe(topics::MATCH_SCORE, forwarding_handler(tx.clone()));
    wait_until("initial subscription", || dispatcher.stats().topics == 1).await;

    // Last unsubscribe tears the transport down
    handle.unsubscribe();
    wait_until("session gone", || dispatcher.session_count() == 0).await;

    // Nothing reconnects afterwards, even past the reconnect delay
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(dispatcher.stats().topics, 0);
}
