//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Published events and per-session frame drops
//! - **Sessions**: Open sessions and active topics
//! - **Clients**: Reconnect attempts and handler panics on the client side
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "live_gateway_events_published_total",
        "Total events published, by topic"
    );
    describe_counter!(
        "live_gateway_frames_delivered_total",
        "Total frames handed to session buffers"
    );
    describe_counter!(
        "live_gateway_frames_dropped_total",
        "Total frames dropped, by reason"
    );

    describe_gauge!("live_gateway_open_sessions", "Currently open sessions");
    describe_gauge!(
        "live_gateway_active_topics",
        "Topics with at least one subscriber"
    );

    describe_counter!(
        "live_gateway_client_reconnects_total",
        "Client transport reconnection attempts"
    );
    describe_counter!(
        "live_gateway_handler_panics_total",
        "Subscription handler panics caught by the multiplexer"
    );
    describe_counter!(
        "live_gateway_malformed_frames_total",
        "Inbound frames dropped because they failed to parse"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Reason a frame was dropped instead of delivered.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// The session was not in the Open state.
    SessionNotOpen,
    /// The session's outbound buffer was full.
    BufferFull,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SessionNotOpen => "session_not_open",
            Self::BufferFull => "buffer_full",
        }
    }
}

/// Record an event published to a topic and how many sessions it reached.
pub fn record_event_published(topic: &str, delivered: u64) {
    counter!(
        "live_gateway_events_published_total",
        "topic" => topic.to_string()
    )
    .increment(1);
    counter!("live_gateway_frames_delivered_total").increment(delivered);
}

/// Record a frame dropped before delivery.
pub fn record_frame_dropped(reason: DropReason) {
    counter!(
        "live_gateway_frames_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the open session count.
pub fn set_open_sessions(count: f64) {
    gauge!("live_gateway_open_sessions").set(count);
}

/// Update the active topic count.
pub fn set_active_topics(count: f64) {
    gauge!("live_gateway_active_topics").set(count);
}

/// Record a client transport reconnection attempt.
pub fn record_client_reconnect() {
    counter!("live_gateway_client_reconnects_total").increment(1);
}

/// Record a handler panic caught during dispatch.
pub fn record_handler_panic(topic: &str) {
    counter!(
        "live_gateway_handler_panics_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record an inbound frame that failed to parse.
pub fn record_malformed_frame() {
    counter!("live_gateway_malformed_frames_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reason_labels() {
        assert_eq!(DropReason::SessionNotOpen.as_str(), "session_not_open");
        assert_eq!(DropReason::BufferFull.as_str(), "buffer_full");
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        // The metrics crate no-ops when no recorder is installed
        record_event_published("match:score", 3);
        record_frame_dropped(DropReason::BufferFull);
        set_open_sessions(1.0);
        record_handler_panic("odds:update");
    }
}
