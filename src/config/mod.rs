//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod business;
mod clients;
mod reconciler;
mod server;
mod storage;
mod webhooks;

pub use business::BusinessConfig;
pub use clients::{NotifierConfig, TrackingConfig};
pub use reconciler::ReconcilerConfig;
pub use server::{CronConfig, ServerConfig};
pub use storage::StorageConfig;
pub use webhooks::WebhookConfig;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ECOMAGGIE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ECOMAGGIE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ECOMAGGIE_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Inbound webhook authenticity configuration.
    pub webhooks: WebhookConfig,
    /// Cron trigger authentication.
    pub cron: CronConfig,
    /// Scheduled reconciler cadences and limits.
    pub reconciler: ReconcilerConfig,
    /// Notification dispatch collaborator.
    pub notifier: NotifierConfig,
    /// Shipment tracking collaborator.
    pub tracking: TrackingConfig,
    /// Marketplace business parameters.
    pub business: BusinessConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `ECOMAGGIE_CONFIG` environment variable (if set)
    /// 4. Environment variables with `ECOMAGGIE` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }
}
