use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::notifications::{EncryptionError, EncryptionService};
use crate::queue::QueueName;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid NOTIFICATION_ENCRYPTION_KEY: {0}")]
    EncryptionKey(#[from] EncryptionError),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub notification_encryption_key: Option<String>,
    pub dashboard_url: String,
    pub worker_pool_size: usize,
    pub tick_interval_seconds: u64,
    pub due_batch_size: u64,
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub provisioned_queues: Vec<QueueName>,
    pub log_dir: String,
    pub http_listen: Option<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialWorkerConfig {
    database_url: Option<String>,
    database_max_connections: Option<u32>,
    notification_encryption_key: Option<String>,
    dashboard_url: Option<String>,
    worker_pool_size: Option<usize>,
    tick_interval_seconds: Option<u64>,
    due_batch_size: Option<u64>,
    queue_capacity: Option<usize>,
    enqueue_timeout_ms: Option<u64>,
    provisioned_queues: Option<Vec<String>>,
    log_dir: Option<String>,
    http_listen: Option<String>,
}

fn default_dashboard_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_http_listen() -> String {
    "0.0.0.0:9464".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            notification_encryption_key: None,
            dashboard_url: default_dashboard_url(),
            worker_pool_size: 32,
            tick_interval_seconds: 5,
            due_batch_size: 500,
            queue_capacity: 1024,
            enqueue_timeout_ms: 2_000,
            provisioned_queues: QueueName::ALL.to_vec(),
            log_dir: default_log_dir(),
            http_listen: Some(default_http_listen()),
        }
    }
}

impl WorkerConfig {
    /// Loads `.env`, then the optional TOML file, then lets environment variables win.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_from(config_path, std::env::vars())
    }

    pub fn load_from<I>(config_path: Option<&Path>, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str::<PartialWorkerConfig>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?
            }
            _ => PartialWorkerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialWorkerConfig = envy::from_iter(env)?;

        // 3. Merge: environment overrides file
        let defaults = WorkerConfig::default();
        let provisioned_queues = match env_config
            .provisioned_queues
            .or(file_config.provisioned_queues)
        {
            Some(names) => parse_queue_names(&names)?,
            None => defaults.provisioned_queues,
        };

        let config = WorkerConfig {
            database_url: env_config.database_url.or(file_config.database_url),
            database_max_connections: env_config
                .database_max_connections
                .or(file_config.database_max_connections)
                .unwrap_or(defaults.database_max_connections),
            notification_encryption_key: env_config
                .notification_encryption_key
                .or(file_config.notification_encryption_key)
                .filter(|k| !k.trim().is_empty()),
            dashboard_url: env_config
                .dashboard_url
                .or(file_config.dashboard_url)
                .unwrap_or(defaults.dashboard_url),
            worker_pool_size: env_config
                .worker_pool_size
                .or(file_config.worker_pool_size)
                .unwrap_or(defaults.worker_pool_size),
            tick_interval_seconds: env_config
                .tick_interval_seconds
                .or(file_config.tick_interval_seconds)
                .unwrap_or(defaults.tick_interval_seconds),
            due_batch_size: env_config
                .due_batch_size
                .or(file_config.due_batch_size)
                .unwrap_or(defaults.due_batch_size),
            queue_capacity: env_config
                .queue_capacity
                .or(file_config.queue_capacity)
                .unwrap_or(defaults.queue_capacity),
            enqueue_timeout_ms: env_config
                .enqueue_timeout_ms
                .or(file_config.enqueue_timeout_ms)
                .unwrap_or(defaults.enqueue_timeout_ms),
            provisioned_queues,
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or(defaults.log_dir),
            http_listen: match env_config.http_listen.or(file_config.http_listen) {
                // An empty value switches the status endpoint off.
                Some(addr) if addr.trim().is_empty() => None,
                Some(addr) => Some(addr),
                None => defaults.http_listen,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid("WORKER_POOL_SIZE must be at least 1".into()));
        }
        if self.tick_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "TICK_INTERVAL_SECONDS must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("QUEUE_CAPACITY must be at least 1".into()));
        }
        if self.due_batch_size == 0 {
            return Err(ConfigError::Invalid("DUE_BATCH_SIZE must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("DATABASE_URL must be set".into()))
    }

    /// `None` when no key is configured; encrypted secrets then fail to resolve.
    pub fn encryption_service(&self) -> Result<Option<EncryptionService>, ConfigError> {
        self.notification_encryption_key
            .as_deref()
            .map(EncryptionService::from_hex)
            .transpose()
            .map_err(ConfigError::from)
    }
}

fn parse_queue_names(names: &[String]) -> Result<Vec<QueueName>, ConfigError> {
    let mut queues = Vec::new();
    for name in names.iter().filter(|n| !n.trim().is_empty()) {
        let queue = name
            .parse::<QueueName>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !queues.contains(&queue) {
            queues.push(queue);
        }
    }
    Ok(queues)
}
