//! Service configuration.
//!
//! Loaded from TOML, then overridden by environment variables, then by
//! command-line flags. [`Config::validate`] runs before anything connects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

use lecturas_source::{DynamoSourceConfig, RetryConfig, ScanOptions};
use lecturas_store::PgStoreConfig;

/// Minimum sync interval in seconds.
pub const MIN_SYNC_INTERVAL: u64 = 5;
/// Maximum sync interval in seconds (1 day).
pub const MAX_SYNC_INTERVAL: u64 = 86_400;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to read variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DB_NAME` | `database.name` |
    /// | `DB_USER` | `database.user` |
    /// | `DB_PASS` | `database.password` |
    /// | `DB_HOST` | `database.host` |
    /// | `DB_PORT` | `database.port` |
    /// | `DYNAMO_TABLE_NAME` | `source.table` |
    /// | `DYNAMO_REGION` | `source.region` |
    /// | `DYNAMO_ENDPOINT_URL` | `source.endpoint_url` |
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = name;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASS") {
            self.database.password = password;
        }
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "DB_PORT",
                message: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(table) = lookup("DYNAMO_TABLE_NAME") {
            self.source.table = table;
        }
        if let Some(region) = lookup("DYNAMO_REGION") {
            self.source.region = region;
        }
        if let Some(endpoint) = lookup("DYNAMO_ENDPOINT_URL") {
            self.source.endpoint_url = Some(endpoint).filter(|e| !e.is_empty());
        }
        Ok(())
    }

    /// Validate the configuration and return every problem found.
    ///
    /// ```
    /// use lecturas_service::Config;
    ///
    /// let mut config = Config::default();
    /// config.database.name = "sensores".to_string();
    /// config.database.user = "sensores".to_string();
    /// config.validate().expect("defaults plus credentials are valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        if self.storage.backend == StorageBackend::Postgres {
            errors.extend(self.database.validate());
        }
        errors.extend(self.source.validate());
        errors.extend(self.sync.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5001").
    pub bind: String,
    /// The one browser origin allowed to call `/api/*`.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5001".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
                Ok(_) => {}
            },
        }

        let origin_ok = (self.cors_origin.starts_with("http://")
            || self.cors_origin.starts_with("https://"))
            && HeaderValue::from_str(&self.cors_origin).is_ok();
        if !origin_ok {
            errors.push(ValidationError::new(
                "server.cors_origin",
                format!(
                    "invalid origin '{}': expected e.g. 'http://localhost:3000'",
                    self.cors_origin
                ),
            ));
        }

        errors
    }
}

/// Which durable store backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Sqlite,
}

/// Durable store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file used by the SQLite backend.
    pub sqlite_path: PathBuf,
    /// Upper bound for read queries, in seconds.
    pub query_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            sqlite_path: lecturas_store::default_db_path(),
            query_timeout_secs: 10,
        }
    }
}

impl StorageConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.backend == StorageBackend::Sqlite && self.sqlite_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.sqlite_path",
                "database path cannot be empty",
            ));
        }
        if self.query_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "storage.query_timeout_secs",
                "timeout must be at least 1 second",
            ));
        }

        errors
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            user: String::new(),
            password: String::new(),
            host: "localhost".to_string(),
            port: 5432,
            max_connections: 5,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push(ValidationError::new(
                "database.name",
                "database name cannot be empty (set DB_NAME)",
            ));
        }
        if self.user.is_empty() {
            errors.push(ValidationError::new(
                "database.user",
                "database user cannot be empty (set DB_USER)",
            ));
        }
        if self.host.is_empty() {
            errors.push(ValidationError::new("database.host", "host cannot be empty"));
        }
        if self.port == 0 {
            errors.push(ValidationError::new("database.port", "port cannot be 0"));
        }
        if self.max_connections == 0 {
            errors.push(ValidationError::new(
                "database.max_connections",
                "pool needs at least 1 connection",
            ));
        }

        errors
    }

    /// Connection settings for the PostgreSQL store.
    pub fn store_config(&self, query_timeout: Duration) -> PgStoreConfig {
        PgStoreConfig {
            host: self.host.clone(),
            port: self.port,
            database: self.name.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            query_timeout,
        }
    }
}

/// Source (DynamoDB) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub table: String,
    pub region: String,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
    /// Items per scan page; unset lets the service decide.
    pub page_size: Option<i32>,
    /// Retries per page after the first attempt.
    pub max_retries: u32,
    pub page_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table: "datos_sensores".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            page_size: None,
            max_retries: 3,
            page_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.table.is_empty() {
            errors.push(ValidationError::new("source.table", "table name cannot be empty"));
        }
        if self.region.is_empty() {
            errors.push(ValidationError::new("source.region", "region cannot be empty"));
        }
        if let Some(size) = self.page_size
            && size < 1
        {
            errors.push(ValidationError::new(
                "source.page_size",
                format!("page size {} must be at least 1", size),
            ));
        }
        if self.page_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "source.page_timeout_secs",
                "timeout must be at least 1 second",
            ));
        }

        errors
    }

    pub fn dynamo_config(&self) -> DynamoSourceConfig {
        DynamoSourceConfig {
            table: self.table.clone(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            page_size: self.page_size,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::default()
            .retry(RetryConfig::new(self.max_retries))
            .page_timeout(Duration::from_secs(self.page_timeout_secs))
    }
}

/// Sync scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled runs.
    pub interval_secs: u64,
    /// Run once synchronously before serving requests.
    pub run_on_start: bool,
    /// Upper bound for one merge, in seconds.
    pub merge_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            run_on_start: true,
            merge_timeout_secs: 120,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_SYNC_INTERVAL {
            errors.push(ValidationError::new(
                "sync.interval_secs",
                format!(
                    "interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_SYNC_INTERVAL
                ),
            ));
        } else if self.interval_secs > MAX_SYNC_INTERVAL {
            errors.push(ValidationError::new(
                "sync.interval_secs",
                format!(
                    "interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_SYNC_INTERVAL
                ),
            ));
        }
        if self.merge_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "sync.merge_timeout_secs",
                "timeout must be at least 1 second",
            ));
        }

        errors
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn merge_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_timeout_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid environment variable {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `sync.interval_secs`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lecturas")
        .join("server.toml")
}
