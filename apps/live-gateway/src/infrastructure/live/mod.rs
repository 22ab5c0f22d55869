//! Per-Match Live Streams
//!
//! Server side of the per-entity stream variant: one broadcast channel per
//! match id, exposed as a `text/event-stream` endpoint. Each record is a
//! JSON-encoded `MatchStreamEvent`. Clients reconnect to this endpoint
//! independently of the general topic transport.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::domain::live::MatchStreamEvent;
use crate::infrastructure::ws::GatewayState;

/// Keep-alive comment interval for SSE connections.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

// =============================================================================
// Match Stream Hub
// =============================================================================

/// Fan-out hub for per-match live streams.
///
/// Channels are created on first subscribe and compacted once the last
/// receiver is gone, so finished matches do not accumulate.
pub struct MatchStreamHub {
    channels: RwLock<HashMap<String, broadcast::Sender<MatchStreamEvent>>>,
    capacity: usize,
}

impl MatchStreamHub {
    /// Create a hub with the given per-match channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Get a receiver for a match, creating the channel on first use.
    #[must_use]
    pub fn subscribe(&self, match_id: &str) -> broadcast::Receiver<MatchStreamEvent> {
        let mut channels = self.channels.write();
        if let Some(tx) = channels.get(match_id) {
            return tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(self.capacity);
        channels.insert(match_id.to_string(), tx);
        rx
    }

    /// Publish an event to its match's stream.
    ///
    /// Returns the number of receivers that got the event, or `None` if no
    /// stream exists for the match (a cheap no-op). A channel whose last
    /// receiver has gone is removed.
    pub fn publish(&self, event: MatchStreamEvent) -> Option<usize> {
        let match_id = event.match_id.clone();
        let result = self
            .channels
            .read()
            .get(&match_id)
            .map(|tx| tx.send(event));

        match result {
            None => None,
            Some(Ok(receivers)) => Some(receivers),
            Some(Err(_)) => {
                // Last receiver gone - compact the entry
                let mut channels = self.channels.write();
                if channels
                    .get(&match_id)
                    .is_some_and(|tx| tx.receiver_count() == 0)
                {
                    channels.remove(&match_id);
                    tracing::debug!(match_id = %match_id, "Live stream channel compacted");
                }
                None
            }
        }
    }

    /// Number of receivers attached to a match's stream.
    #[must_use]
    pub fn receiver_count(&self, match_id: &str) -> usize {
        self.channels
            .read()
            .get(match_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Number of matches with an active stream channel.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.channels.read().len()
    }
}

// =============================================================================
// SSE Handler
// =============================================================================

/// `GET /matches/{match_id}/stream` - per-match live event stream.
pub(crate) async fn match_stream_handler(
    Path(match_id): Path<String>,
    State(state): State<GatewayState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.live.subscribe(&match_id);
    tracing::debug!(match_id = %match_id, "Live stream subscriber attached");

    let stream = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok::<_, Infallible>(Event::default().data(json))),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize live stream event");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "Live stream receiver lagged, events skipped");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

// =============================================================================
// Tests
// =============================================================================
