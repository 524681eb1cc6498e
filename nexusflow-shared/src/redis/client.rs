/// Redis connection handle
///
/// Redis is optional: without `REDIS_URL` the API falls back to in-process
/// rate limiting. When configured, one [`RedisClient`] is built at startup
/// and cloned into every consumer; the underlying `ConnectionManager`
/// reconnects on its own after failures.
///
/// # Example
///
/// ```no_run
/// use nexusflow_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// if let Some(config) = RedisConfig::from_env()? {
///     let client = RedisClient::new(config).await?;
///     assert!(client.ping().await?);
/// }
/// # Ok(())
/// # }
/// ```

use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis command timed out after {0:?}")]
    Timeout(Duration),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://[user:password@]host:port[/db]`
    pub url: String,

    /// Prepended to every key so several deployments can share one server
    pub key_prefix: String,

    pub command_timeout_secs: u64,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "nexusflow".to_string(),
            command_timeout_secs: 2,
        }
    }

    /// Reads `REDIS_URL`, `REDIS_KEY_PREFIX` and `REDIS_COMMAND_TIMEOUT_SECS`.
    ///
    /// Returns `Ok(None)` when `REDIS_URL` is unset or empty.
    pub fn from_env() -> Result<Option<Self>, RedisClientError> {
        let url = match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Ok(None),
        };

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(RedisClientError::ConfigError(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        let mut config = Self::new(url);

        if let Ok(prefix) = env::var("REDIS_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        if let Ok(secs) = env::var("REDIS_COMMAND_TIMEOUT_SECS") {
            config.command_timeout_secs = secs.parse().map_err(|_| {
                RedisClientError::ConfigError("REDIS_COMMAND_TIMEOUT_SECS must be a number".to_string())
            })?;
        }

        Ok(Some(config))
    }
}

#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| RedisClientError::ConnectionError(e.to_string()))?;

        tracing::info!(url = %sanitize_url(&config.url), "Connected to Redis");

        Ok(Self {
            manager,
            config: Arc::new(config),
        })
    }

    /// PING with the configured command timeout
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();
        let pong: String = self
            .with_timeout(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;

        Ok(pong == "PONG")
    }

    /// Connection handle for issuing commands
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// `{prefix}:{suffix}`
    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.config.key_prefix, suffix)
    }

    /// Runs a Redis future, failing with `Timeout` after
    /// `command_timeout_secs`
    pub async fn with_timeout<T, F>(&self, fut: F) -> Result<T, RedisClientError>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        let limit = Duration::from_secs(self.config.command_timeout_secs);

        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RedisClientError::Timeout(limit))?
            .map_err(RedisClientError::from)
    }
}

/// Masks credentials for logging
pub fn sanitize_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***@{}", &url[..scheme_end + 3], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
