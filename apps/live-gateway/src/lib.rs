#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Live Gateway - Real-Time Update Distribution
//!
//! Pushes match-state, odds, and bet-settlement changes from in-process
//! producers to many concurrently connected WebSocket clients, and exposes
//! a per-match SSE stream for single-match live views. The crate also ships
//! the client side: a subscription multiplexer that survives disconnects
//! and replays its subscriptions transparently.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Wire frames, topic vocabulary, and subscriber bookkeeping
//!   - `topic`: Event frames and the canonical topic vocabulary
//!   - `live`: Per-match stream records
//!   - `registry`: Topic → session membership with purge-on-close
//!
//! - **Infrastructure**: Adapters binding the domain to real transports
//!   - `session`: One connected WebSocket peer
//!   - `broadcast`: Topic fan-out to live sessions
//!   - `ws`: WebSocket endpoint
//!   - `live`: Per-match SSE endpoint
//!   - `config`: Environment-driven configuration
//!   - `health`: Health check HTTP endpoint
//!
//! - **Client**: Consumer-side counterpart
//!   - `multiplexer`: Many handlers over one transport, ref-counted
//!   - `transport`: Connection actor with reconnect and replay
//!   - `live`: Per-match SSE consumer
//!
//! # Data Flow
//!
//! ```text
//! Match ingestion ──┐
//!                   │     ┌─────────────┐     ┌─────────────┐
//! Odds ingestion  ──┼────▶│  Broadcast  │────▶│  WebSocket  │──▶ Client 1
//!                   │     │  Dispatcher │     │  Sessions   │──▶ Client 2
//! Bet settlement  ──┘     └─────────────┘     └─────────────┘──▶ Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Wire frames, topics, and subscriber bookkeeping.
pub mod domain;

/// Infrastructure layer - Transport adapters and operational endpoints.
pub mod infrastructure;

/// Client layer - Subscription multiplexer and reconnecting transports.
pub mod client;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::live::{MatchEventKind, MatchStreamEvent};
pub use domain::registry::{RegistryStats, SessionId, TopicRegistry};
pub use domain::topic::{ClientCommand, EventFrame, Topic, topics};

// Infrastructure
pub use infrastructure::broadcast::{BroadcastDispatcher, DispatcherStats};
pub use infrastructure::config::{ConfigError, GatewayConfig, ServerSettings, StreamSettings};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::live::MatchStreamHub;
pub use infrastructure::session::{ConnectionSession, SessionState};
pub use infrastructure::ws::gateway_router;

// Client
pub use client::live::{MatchStreamClient, MatchStreamClientConfig, MatchStreamClientError};
pub use client::multiplexer::{ClientConfig, LinkState, SubscriptionHandle, UpdateMultiplexer};
pub use client::reconnect::{ReconnectConfig, ReconnectPolicy};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
