//! Gateway Transport Actor
//!
//! Drives the client's single WebSocket connection: connect, replay the
//! multiplexer's desired subscriptions, pump frames, and reconnect with
//! the configured delay policy when the connection drops. Cancellation
//! deterministically stops a pending reconnect timer, and a connect that
//! completes after cancellation closes its socket instead of resuming.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::multiplexer::{LinkState, MuxInner};
use super::reconnect::ReconnectPolicy;
use crate::domain::topic::{ClientCommand, EventFrame};
use crate::infrastructure::metrics;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Commands from the multiplexer to the transport.
#[derive(Debug)]
pub(crate) enum TransportCommand {
    Subscribe(String),
    Unsubscribe(String),
    Publish {
        topic: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, thiserror::Error)]
enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed by gateway")]
    ConnectionClosed,

    #[error("liveness timeout")]
    LivenessTimeout,
}

/// Run the transport until cancelled or retries are exhausted.
pub(crate) async fn run(
    mux: Arc<MuxInner>,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    cancel: CancellationToken,
) {
    let mut policy = ReconnectPolicy::new(mux.config().reconnect.clone());

    loop {
        if cancel.is_cancelled() {
            break;
        }

        mux.mark_link(LinkState::Connecting);
        match connect_and_run(&mux, &mut cmd_rx, &cancel, &mut policy).await {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Gateway connection error");
                mux.mark_link(LinkState::Disconnected);

                if let Some(delay) = policy.next_delay() {
                    let attempt = policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting to gateway"
                    );
                    metrics::record_client_reconnect();

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                } else {
                    tracing::error!("Maximum reconnection attempts exceeded");
                    break;
                }
            }
        }
    }

    mux.mark_link(LinkState::Disconnected);
}

/// Connect once and pump frames until an error or cancellation.
async fn connect_and_run(
    mux: &Arc<MuxInner>,
    cmd_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    cancel: &CancellationToken,
    policy: &mut ReconnectPolicy,
) -> Result<(), TransportError> {
    let url = mux.config().url.clone();
    tracing::debug!(url = %url, "Connecting to gateway");

    let (mut ws, _response) = tokio_tungstenite::connect_async(&url).await?;

    // Teardown may have raced the connect; never resume after cancellation
    if cancel.is_cancelled() {
        let _ = ws.close(None).await;
        return Ok(());
    }

    let (mut write, mut read) = ws.split();
    policy.reset();
    mux.mark_link(LinkState::Connected);
    tracing::info!(url = %url, "Gateway connected");

    // Replay the desired-subscriptions set; handlers were never lost, so
    // nothing is double-delivered
    for topic in mux.desired_topics() {
        send_command(&mut write, &ClientCommand::Subscribe { topic }).await?;
    }

    let mut ping_interval = tokio::time::interval(mux.config().ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = ping_interval.tick() => {
                if last_seen.elapsed() > mux.config().liveness_timeout {
                    return Err(TransportError::LivenessTimeout);
                }
                write.send(Message::Ping(vec![].into())).await?;
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Subscribe(topic)) => {
                        send_command(&mut write, &ClientCommand::Subscribe { topic }).await?;
                    }
                    Some(TransportCommand::Unsubscribe(topic)) => {
                        send_command(&mut write, &ClientCommand::Unsubscribe { topic }).await?;
                    }
                    Some(TransportCommand::Publish { topic, payload }) => {
                        send_command(&mut write, &ClientCommand::Publish { topic, payload }).await?;
                    }
                    None => {
                        // Multiplexer gone
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match EventFrame::from_json(text.as_str()) {
                            Ok(frame) => mux.dispatch_frame(&frame.topic, &frame.payload),
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping malformed frame");
                                metrics::record_malformed_frame();
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(TransportError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(TransportError::ConnectionClosed),
                }
            }
        }
    }
}

async fn send_command(write: &mut WsSink, command: &ClientCommand) -> Result<(), TransportError> {
    match command.to_json() {
        Ok(json) => {
            write.send(Message::Text(json.into())).await?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize client command");
            Ok(())
        }
    }
}
