//! WebSocket Streaming Integration Tests
//!
//! Exercises subscribe/publish delivery over real sockets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use live_gateway::infrastructure::ws::GatewayState;
use live_gateway::{
    BroadcastDispatcher, EventFrame, MatchStreamHub, StreamSettings, TopicRegistry, gateway_router,
    topics,
};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_gateway() -> (String, Arc<BroadcastDispatcher>) {
    let registry = Arc::new(TopicRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(registry));
    let hub = Arc::new(MatchStreamHub::new(64));
    let state = GatewayState::new(
        Arc::clone(&dispatcher),
        hub,
        StreamSettings::default(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, gateway_router(state)).await.unwrap();
    });

    (format!("127.0.0.1:{}", addr.port()), dispatcher)
}

async fn connect_client(addr: &str) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send_subscribe(client: &mut WsClient, topic: &str) {
    let cmd = format!(r#"{{"action":"subscribe","topic":"{topic}"}}"#);
    client.send(Message::Text(cmd.into())).await.unwrap();
}

async fn wait_for_topic_count(dispatcher: &BroadcastDispatcher, count: usize) {
    timeout(Duration::from_secs(2), async {
        while dispatcher.stats().topics != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected topic count");
}

async fn next_frame(client: &mut WsClient) -> EventFrame {
    let msg = timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error");

    match msg {
        Message::Text(text) => EventFrame::from_json(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn subscriber_receives_published_event() {
    let (addr, dispatcher) = spawn_gateway().await;

    let mut score_client = connect_client(&addr).await;
    let mut odds_client = connect_client(&addr).await;

    send_subscribe(&mut score_client, topics::MATCH_SCORE).await;
    send_subscribe(&mut odds_client, topics::ODDS_UPDATE).await;
    wait_for_topic_count(&dispatcher, 2).await;

    let payload = json!({"matchId": "7", "home": 1, "away": 0});
    let delivered = dispatcher.publish(topics::MATCH_SCORE, payload.clone());
    assert_eq!(delivered, 1);

    let frame = next_frame(&mut score_client).await;
    assert_eq!(frame.topic, topics::MATCH_SCORE);
    assert_eq!(frame.payload, payload);

    // The odds subscriber receives nothing
    let nothing = timeout(Duration::from_millis(200), odds_client.next()).await;
    assert!(nothing.is_err(), "odds subscriber must not receive score events");
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let (addr, dispatcher) = spawn_gateway().await;

    let mut client = connect_client(&addr).await;
    send_subscribe(&mut client, topics::MATCH_TIMELINE).await;
    wait_for_topic_count(&dispatcher, 1).await;

    for i in 0..10 {
        dispatcher.publish(topics::MATCH_TIMELINE, json!({"seq": i}));
    }

    for i in 0..10 {
        let frame = next_frame(&mut client).await;
        assert_eq!(frame.payload, json!({"seq": i}));
    }
}

#[tokio::test]
async fn client_publish_fans_out_to_subscribers() {
    let (addr, dispatcher) = spawn_gateway().await;

    let mut subscriber = connect_client(&addr).await;
    let mut publisher = connect_client(&addr).await;

    send_subscribe(&mut subscriber, topics::ODDS_UPDATE).await;
    wait_for_topic_count(&dispatcher, 1).await;

    let cmd = r#"{"action":"publish","topic":"odds:update","payload":{"marketId":"m1","odds":2.4}}"#;
    publisher.send(Message::Text(cmd.into())).await.unwrap();

    let frame = next_frame(&mut subscriber).await;
    assert_eq!(frame.topic, topics::ODDS_UPDATE);
    assert_eq!(frame.payload, json!({"marketId": "m1", "odds": 2.4}));
}

#[tokio::test]
async fn malformed_frame_does_not_kill_the_session() {
    let (addr, dispatcher) = spawn_gateway().await;

    let mut client = connect_client(&addr).await;
    client
        .send(Message::Text("{definitely not json".into()))
        .await
        .unwrap();

    // The session is still usable afterwards
    send_subscribe(&mut client, topics::BET_SETTLED).await;
    wait_for_topic_count(&dispatcher, 1).await;

    dispatcher.publish(topics::BET_SETTLED, json!({"betId": "9"}));
    let frame = next_frame(&mut client).await;
    assert_eq!(frame.topic, topics::BET_SETTLED);
}

#[tokio::test]
async fn disconnect_purges_the_registry() {
    let (addr, dispatcher) = spawn_gateway().await;

    let mut client = connect_client(&addr).await;
    send_subscribe(&mut client, topics::MATCH_SCORE).await;
    send_subscribe(&mut client, topics::ODDS_UPDATE).await;
    wait_for_topic_count(&dispatcher, 2).await;

    client.close(None).await.unwrap();

    wait_for_topic_count(&dispatcher, 0).await;
    timeout(Duration::from_secs(2), async {
        while dispatcher.session_count() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never removed after disconnect");

    // Publishing into the emptied topic is a no-op
    assert_eq!(dispatcher.publish(topics::MATCH_SCORE, json!({})), 0);
}
