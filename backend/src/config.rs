//! Configuration management for the inventory tracker
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with INVT__ prefix
//! 4. The plain deployment variables DB_URI, DB_PROVIDER, PORT and NODE_ENV

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::rebuild::PricePolicy;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Object storage configuration
    pub storage: StorageConfig,

    /// Inventory rebuild configuration
    pub inventory: InventoryConfig,

    /// Sales configuration
    pub sales: SalesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,

    /// Request deadline in seconds
    pub request_timeout_secs: u64,

    /// Deadline for the rebuild-inventory routes in seconds
    pub rebuild_timeout_secs: u64,

    /// Upload limit in bytes
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Provider name; only `postgres` is implemented
    pub provider: String,

    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,

    /// Attempts for a serializable transaction before giving up
    pub transaction_retries: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,

    /// Key prefix for uploaded files
    pub prefix: String,

    /// S3 bucket name
    pub bucket: Option<String>,

    /// S3 region
    pub region: Option<String>,

    /// Base URL prepended to stored keys
    pub public_base_url: Option<String>,

    /// Root directory for the local provider
    pub local_root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Items rebuilt per batch
    pub rebuild_batch_size: usize,

    /// Whether a rebuild also rewrites the sell price
    pub rebuild_price_policy: PricePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SalesConfig {
    /// Zero-padded width of generated invoice numbers
    pub invoice_number_width: usize,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("INVT_ENVIRONMENT")
            .or_else(|_| std::env::var("NODE_ENV"))
            .unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.rebuild_timeout_secs", 120)?
            .set_default("server.max_upload_bytes", shared::MAX_IMAGE_BYTES as u64)?
            .set_default("database.provider", "postgres")?
            .set_default("database.url", "postgres://localhost/inventory")?
            .set_default("database.max_connections", 50)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.transaction_retries", 3)?
            .set_default("storage.provider", "local")?
            .set_default("storage.prefix", "inventory")?
            .set_default("storage.local_root", "uploads")?
            .set_default("inventory.rebuild_batch_size", 50)?
            .set_default("inventory.rebuild_price_policy", "follow_cost")?
            .set_default("sales.invoice_number_width", 6)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (INVT__ prefix)
            .add_source(
                Environment::with_prefix("INVT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            // Deployment variables win over everything else
            .set_override_option("database.url", std::env::var("DB_URI").ok())?
            .set_override_option("database.provider", std::env::var("DB_PROVIDER").ok())?
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Fails fast on settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.provider()?;
        if self.storage.provider == StorageProvider::S3 && self.storage.bucket.is_none() {
            return Err(ConfigError::Message(
                "storage.bucket is required for the s3 provider".to_string(),
            ));
        }
        if self.inventory.rebuild_batch_size == 0 {
            return Err(ConfigError::Message(
                "inventory.rebuild_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl DatabaseConfig {
    pub fn provider(&self) -> Result<DatabaseProvider, ConfigError> {
        match self.provider.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseProvider::Postgres),
            other => Err(ConfigError::Message(format!(
                "unsupported database provider '{}', only postgres is available",
                other
            ))),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rebuild_timeout(&self) -> Duration {
        Duration::from_secs(self.rebuild_timeout_secs)
    }
}
