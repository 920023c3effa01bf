//! Configuration management

use roster_common::{Result, RosterError};
use roster_ingest::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default directory uploaded files are written to.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Default request body cap for uploads (50 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 << 30;

/// Default number of finished runs kept for `/runs`
pub const DEFAULT_RETAINED_RUNS: usize = 100;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/roster";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default number of connection attempts at start-up.
pub const DEFAULT_DATABASE_CONNECT_RETRIES: u32 = 10;

/// Default pause between connection attempts in seconds.
pub const DEFAULT_DATABASE_CONNECT_RETRY_DELAY_SECS: u64 = 5;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub logs: LogsConfig,
    pub pipeline: PipelineConfig,
}

/// Where records are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process memory; lost on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = RosterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(RosterError::Config(format!("Invalid storage backend: {}", s))),
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub storage: StorageBackend,
    /// Finished runs kept queryable through `/runs`
    pub retained_runs: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub connect_retries: u32,
    pub connect_retry_delay_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Log analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogsConfig {
    /// JSON log file served by `/logs`; defaults to the file the server
    /// itself writes
    pub file: Option<PathBuf>,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage = match std::env::var("ROSTER_STORAGE") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::default(),
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("ROSTER_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("ROSTER_PORT").unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse("ROSTER_SHUTDOWN_TIMEOUT")
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                upload_dir: std::env::var("ROSTER_UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
                max_upload_bytes: env_parse("ROSTER_MAX_UPLOAD_BYTES")
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
                storage,
                retained_runs: env_parse("ROSTER_RETAINED_RUNS").unwrap_or(DEFAULT_RETAINED_RUNS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
                connect_retries: env_parse("DATABASE_CONNECT_RETRIES")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_RETRIES),
                connect_retry_delay_secs: env_parse("DATABASE_CONNECT_RETRY_DELAY")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_RETRY_DELAY_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS").unwrap_or(true),
            },
            logs: LogsConfig {
                file: std::env::var("LOGS_FILE").ok().map(PathBuf::from),
            },
            pipeline: PipelineConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RosterError::Config("Server port must be greater than 0".to_string()));
        }

        if self.server.upload_dir.as_os_str().is_empty() {
            return Err(RosterError::Config("Upload directory cannot be empty".to_string()));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(RosterError::Config(
                "Upload size limit must be greater than 0".to_string(),
            ));
        }

        if self.server.storage == StorageBackend::Postgres {
            if self.database.url.is_empty() {
                return Err(RosterError::Config("Database URL cannot be empty".to_string()));
            }

            if self.database.max_connections == 0 {
                return Err(RosterError::Config(
                    "Database max_connections must be greater than 0".to_string(),
                ));
            }

            if self.database.min_connections > self.database.max_connections {
                return Err(RosterError::Config(format!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections, self.database.max_connections
                )));
            }

            // Every writer holds a connection while inserting
            if (self.database.max_connections as usize) < self.pipeline.worker_count {
                tracing::warn!(
                    max_connections = self.database.max_connections,
                    workers = self.pipeline.worker_count,
                    "Fewer database connections than writers, writers will queue for connections"
                );
            }
        }

        self.pipeline
            .validate()
            .map_err(|e| RosterError::Config(e.to_string()))?;

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Upload cap as a body limit, saturating on narrow targets
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.server.max_upload_bytes).unwrap_or(usize::MAX)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                storage: StorageBackend::default(),
                retained_runs: DEFAULT_RETAINED_RUNS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                connect_retries: DEFAULT_DATABASE_CONNECT_RETRIES,
                connect_retry_delay_secs: DEFAULT_DATABASE_CONNECT_RETRY_DELAY_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            logs: LogsConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.pipeline.worker_count, 10);
    }

    #[test]
    fn test_min_connections_above_max_rejected() {
        let mut config = Config::default();
        config.database.min_connections = 50;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, RosterError::Config(_)));
        assert!(err.to_string().contains("min_connections"));
    }

    #[test]
    fn test_memory_backend_ignores_database_settings() {
        let mut config = Config::default();
        config.server.storage = StorageBackend::Memory;
        config.database.url = String::new();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_pipeline_rejected() {
        let mut config = Config::default();
        config.pipeline.queue_capacity = 0;

        assert!(matches!(config.validate(), Err(RosterError::Config(_))));
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("Memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("postgresql".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_environment() {
        std::env::set_var("ROSTER_PORT", "9191");
        std::env::set_var("ROSTER_STORAGE", "memory");
        std::env::set_var("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test");
        std::env::set_var("INGEST_BATCH_SIZE", "250");
        std::env::set_var("ROSTER_RETAINED_RUNS", "7");

        let config = Config::load();

        std::env::remove_var("ROSTER_PORT");
        std::env::remove_var("ROSTER_STORAGE");
        std::env::remove_var("CORS_ALLOWED_ORIGINS");
        std::env::remove_var("INGEST_BATCH_SIZE");
        std::env::remove_var("ROSTER_RETAINED_RUNS");

        let config = config.unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.server.storage, StorageBackend::Memory);
        assert_eq!(config.cors.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.pipeline.batch_size, 250);
        assert_eq!(config.server.retained_runs, 7);
    }
}
