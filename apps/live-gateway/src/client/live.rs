//! Per-Match Live Stream Consumer
//!
//! Connects to the gateway's `text/event-stream` endpoint for one match
//! and forwards parsed records over a channel. Reconnects with a flat
//! delay, independently of the general topic transport.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::reconnect::DEFAULT_RECONNECT_DELAY;
use crate::domain::live::MatchStreamEvent;

/// Errors from the per-match stream client.
#[derive(Debug, thiserror::Error)]
pub enum MatchStreamClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint returned a non-success status.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    /// Endpoint is not an event stream.
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// Server closed the stream.
    #[error("stream ended")]
    StreamEnded,
}

/// Configuration for the per-match stream client.
#[derive(Debug, Clone)]
pub struct MatchStreamClientConfig {
    /// Gateway base URL, e.g. `http://gateway:8090`.
    pub base_url: String,
    /// Delay before reconnecting after a stream failure.
    pub reconnect_delay: Duration,
    /// Timeout for establishing the HTTP connection.
    pub connect_timeout: Duration,
}

impl MatchStreamClientConfig {
    /// Create a configuration with the default flat reconnect delay.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Client for one match's live stream.
///
/// Runs until cancelled or the event receiver is dropped; stream failures
/// are retried after the configured delay. Events arriving while
/// disconnected are lost, which is an accepted property of the stream.
pub struct MatchStreamClient {
    config: MatchStreamClientConfig,
    match_id: String,
    event_tx: mpsc::Sender<MatchStreamEvent>,
    cancel: CancellationToken,
}

impl MatchStreamClient {
    /// Create a client for a match.
    #[must_use]
    pub fn new(
        config: MatchStreamClientConfig,
        match_id: impl Into<String>,
        event_tx: mpsc::Sender<MatchStreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            match_id: match_id.into(),
            event_tx,
            cancel,
        }
    }

    /// Run the stream loop.
    ///
    /// # Errors
    ///
    /// Currently always recovers by reconnecting; returns `Ok` on
    /// cancellation or when the consumer goes away.
    pub async fn run(self) -> Result<(), MatchStreamClientError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match self.stream_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(match_id = %self.match_id, error = %e, "Live stream error");

                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    async fn stream_once(&self) -> Result<(), MatchStreamClientError> {
        let url = format!(
            "{}/matches/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            self.match_id
        );
        tracing::debug!(url = %url, "Connecting to live stream");

        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .build()?;

        let response = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MatchStreamClientError::UnexpectedStatus(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("text/event-stream") {
            return Err(MatchStreamClientError::UnexpectedContentType(content_type));
        }

        tracing::debug!(match_id = %self.match_id, "Live stream connected");

        let mut body = response.bytes_stream();
        let mut parser = SseLineBuffer::default();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            for data in parser.push(&bytes) {
                                match serde_json::from_str::<MatchStreamEvent>(&data) {
                                    Ok(event) => {
                                        if self.event_tx.send(event).await.is_err() {
                                            // Consumer gone
                                            return Ok(());
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            error = %e,
                                            "Dropping malformed live stream record"
                                        );
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(MatchStreamClientError::StreamEnded),
                    }
                }
            }
        }
    }
}

// =============================================================================
// SSE Line Protocol
// =============================================================================

/// Incremental parser for the `text/event-stream` line protocol.
///
/// Accumulates `data:` lines and yields each event's payload at the blank
/// line terminating it. Comments and other fields are ignored.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buffer: String,
    data_lines: Vec<String>,
}

impl SseLineBuffer {
    /// Feed a chunk; returns the payloads of any completed events.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut completed = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    completed.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }

        completed
    }
}

// =============================================================================
// Tests
// =============================================================================
