//! HTTP server and cron trigger configuration.

use serde::Deserialize;

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port. 0 lets the OS assign an ephemeral port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Cron trigger authentication.
///
/// The cron endpoints compare the shared secret against `x-cron-secret` or
/// `Authorization: Bearer <secret>`. With no secret configured the endpoints
/// reject every request, so a deployment cannot accidentally expose the
/// pollers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// Shared secret expected from the external scheduler.
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_cron_defaults_closed() {
        assert!(CronConfig::default().secret.is_none());
    }
}
