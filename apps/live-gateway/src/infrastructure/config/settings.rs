//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Gateway HTTP port (WebSocket and SSE endpoints).
    pub port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8090,
            health_port: 8091,
        }
    }
}

/// Stream buffering settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Outbound frame buffer per WebSocket session.
    pub session_buffer: usize,
    /// Capacity of each per-match broadcast channel.
    pub match_stream_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            session_buffer: 256,
            match_stream_capacity: 1_024,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Stream buffering settings.
    pub stream: StreamSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// All variables are optional and fall back to defaults:
    ///
    /// - `LIVE_GATEWAY_PORT`
    /// - `LIVE_GATEWAY_HEALTH_PORT`
    /// - `LIVE_GATEWAY_SESSION_BUFFER`
    /// - `LIVE_GATEWAY_MATCH_STREAM_CAPACITY`
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway and health ports collide.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerSettings {
            port: parse_env_u16("LIVE_GATEWAY_PORT", ServerSettings::default().port),
            health_port: parse_env_u16(
                "LIVE_GATEWAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        if server.port == server.health_port {
            return Err(ConfigError::PortCollision(server.port));
        }

        let stream = StreamSettings {
            session_buffer: parse_env_usize(
                "LIVE_GATEWAY_SESSION_BUFFER",
                StreamSettings::default().session_buffer,
            ),
            match_stream_capacity: parse_env_usize(
                "LIVE_GATEWAY_MATCH_STREAM_CAPACITY",
                StreamSettings::default().match_stream_capacity,
            ),
        };

        Ok(Self { server, stream })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Gateway and health server cannot share a port.
    #[error("gateway and health server cannot both bind port {0}")]
    PortCollision(u16),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
