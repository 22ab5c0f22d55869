//! Client Layer - Consumer-side counterpart of the gateway.
//!
//! A process holds one `UpdateMultiplexer` over one WebSocket transport;
//! many independent call sites register handlers for named topics through
//! it. The transport reconnects on failure and replays the desired
//! subscriptions; handlers are never re-registered and never lost.

/// Subscription multiplexer and handles.
pub mod multiplexer;

/// Reconnection delay policy.
pub mod reconnect;

/// Per-match SSE stream consumer.
pub mod live;

pub(crate) mod transport;
