//! Live Gateway Binary
//!
//! Starts the real-time update gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin live-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `LIVE_GATEWAY_PORT`: Gateway HTTP port for /ws and match streams (default: 8090)
//! - `LIVE_GATEWAY_HEALTH_PORT`: Health check HTTP port (default: 8091)
//! - `LIVE_GATEWAY_SESSION_BUFFER`: Outbound frames buffered per session (default: 256)
//! - `LIVE_GATEWAY_MATCH_STREAM_CAPACITY`: Per-match channel capacity (default: 1024)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: live-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use live_gateway::infrastructure::telemetry;
use live_gateway::infrastructure::ws::GatewayState;
use live_gateway::{
    BroadcastDispatcher, GatewayConfig, HealthServer, HealthServerState, MatchStreamHub,
    TopicRegistry, gateway_router, init_metrics, topics,
};
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// How long the server loop gets to wind down after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Live Gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Core components
    let registry = Arc::new(TopicRegistry::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));
    let live_hub = Arc::new(MatchStreamHub::new(config.stream.match_stream_capacity));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&dispatcher),
        Arc::clone(&live_hub),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Gateway server (/ws and /matches/{id}/stream)
    let state = GatewayState::new(
        Arc::clone(&dispatcher),
        Arc::clone(&live_hub),
        config.stream.clone(),
    );
    let app = gateway_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");

    let server_shutdown = shutdown_token.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "Gateway server error");
        }
        tracing::info!("Gateway server stopped");
    });

    tracing::info!("Gateway ready");

    await_shutdown().await;

    // Tell connected clients we are going away, give the frame a moment to
    // flush, then drop the sessions
    dispatcher.publish(topics::SYSTEM_MAINTENANCE, json!({"status": "shutting_down"}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    dispatcher.close_all();
    shutdown_token.cancel();

    let _ = tokio::time::timeout(SHUTDOWN_GRACE, server).await;
    tracing::info!("Gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        port = config.server.port,
        health_port = config.server.health_port,
        session_buffer = config.stream.session_buffer,
        match_stream_capacity = config.stream.match_stream_capacity,
        "Configuration loaded"
    );
}

/// Load a .env file from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
