//! WebSocket Endpoint
//!
//! Binds connected peers to the broadcast dispatcher. Each accepted
//! connection becomes a `ConnectionSession` with a writer task draining
//! its outbound buffer; the reader loop handles subscribe/unsubscribe/
//! publish control frames until the peer goes away, at which point the
//! session closes and the registry is purged.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::registry::SessionId;
use crate::domain::topic::ClientCommand;
use crate::infrastructure::broadcast::BroadcastDispatcher;
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::live::{MatchStreamHub, match_stream_handler};
use crate::infrastructure::metrics;
use crate::infrastructure::session::ConnectionSession;

// =============================================================================
// Gateway State and Router
// =============================================================================

/// Shared state for the gateway's HTTP surface.
#[derive(Clone)]
pub struct GatewayState {
    /// Topic fan-out.
    pub dispatcher: Arc<BroadcastDispatcher>,
    /// Per-match live streams.
    pub live: Arc<MatchStreamHub>,
    /// Stream buffering settings.
    pub settings: StreamSettings,
}

impl GatewayState {
    /// Create gateway state.
    #[must_use]
    pub fn new(
        dispatcher: Arc<BroadcastDispatcher>,
        live: Arc<MatchStreamHub>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            dispatcher,
            live,
            settings,
        }
    }
}

/// Build the gateway router: the WebSocket endpoint and the per-match
/// SSE stream endpoint.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/matches/{match_id}/stream", get(match_stream_handler))
        .with_state(state)
}

// =============================================================================
// WebSocket Handling
// =============================================================================

fn next_session_id() -> SessionId {
    uuid::Uuid::new_v4().as_u64_pair().0
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(state.settings.session_buffer);

    let session = Arc::new(ConnectionSession::new(next_session_id(), outbound_tx));
    let cancel = session.cancelled();
    state.dispatcher.register(Arc::clone(&session));
    session.open();

    tracing::debug!(session_id = session.id(), "WebSocket connected");

    // Writer task: drains the session's outbound buffer into the socket.
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    // Reader loop: control frames from the peer.
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&state, &session, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = session.id(), "Peer disconnected");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by the protocol layer
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = session.id(), error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    session.close();
    let _ = writer.await;
}

fn handle_command(state: &GatewayState, session: &ConnectionSession, text: &str) {
    match ClientCommand::from_json(text) {
        Ok(ClientCommand::Subscribe { topic }) => {
            state.dispatcher.subscribe(session.id(), &topic);
        }
        Ok(ClientCommand::Unsubscribe { topic }) => {
            state.dispatcher.unsubscribe(session.id(), &topic);
        }
        Ok(ClientCommand::Publish { topic, payload }) => {
            state.dispatcher.publish(&topic, payload);
        }
        Err(e) => {
            tracing::warn!(
                session_id = session.id(),
                error = %e,
                "Dropping malformed inbound frame"
            );
            metrics::record_malformed_frame();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
