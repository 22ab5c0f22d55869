//! Infrastructure Layer - Transport adapters and operational endpoints.
//!
//! This layer binds the domain bookkeeping to real transports and hosts
//! the operational HTTP surface.

/// Connected WebSocket peer sessions.
pub mod session;

/// Topic fan-out to live sessions.
pub mod broadcast;

/// WebSocket endpoint.
pub mod ws;

/// Per-match SSE stream endpoint.
pub mod live;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
