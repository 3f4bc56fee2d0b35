//! Redis-backed cache store.
//!
//! One `ConnectionManager` is created on first use and cloned per operation; it
//! multiplexes commands over a single socket and reconnects on its own after failures.
//! Values are stored with `SETEX` so Redis owns expiry.

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;

/// Bound on establishing the shared connection.
///
/// Only the startup `ping` waits this long; inside the read-through path the cache
/// manager's per-operation timeout is shorter and wins, and the next operation retries.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisCache {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
}

impl RedisCache {
    /// Create a client without touching the network.
    ///
    /// Connection problems surface on the first `get`/`set_with_expiry`, where the
    /// read-through layer treats them as misses.
    pub fn open(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid redis url: {}", e),
                ErrorContext::new()
                    .with_field_path("redis_url")
                    .with_source("redis_cache"),
            )
        })?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Round-trip a `PING`; used at startup to log whether the cache is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error(format!("redis ping failed: {}", e)))?;
        if pong != "PONG" {
            return Err(cache_error(format!("unexpected ping reply: {}", pong)));
        }
        Ok(())
    }

    /// Clone of the shared connection, establishing it on first call.
    ///
    /// A failed or timed-out attempt leaves the cell empty so a later call retries.
    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let manager =
                    timeout(self.connect_timeout, ConnectionManager::new(self.client.clone()))
                        .await
                        .map_err(|_| {
                            cache_error(format!(
                                "redis connection not established within {} ms",
                                self.connect_timeout.as_millis()
                            ))
                        })?
                        .map_err(|e| cache_error(format!("failed to connect to redis: {}", e)))?;
                tracing::debug!("redis connection established");
                Ok::<_, Error>(manager)
            })
            .await?;
        Ok(conn.clone())
    }
}

fn cache_error(msg: String) -> Error {
    Error::cache_with_context(msg, ErrorContext::new().with_source("redis_cache"))
}

/// Redis rejects `SETEX` with a zero TTL.
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn get_cmd(key: &CacheKey) -> Cmd {
    let mut cmd = redis::cmd("GET");
    cmd.arg(key.as_str());
    cmd
}

fn setex_cmd(key: &CacheKey, value: &[u8], ttl: Duration) -> Cmd {
    let mut cmd = redis::cmd("SETEX");
    cmd.arg(key.as_str()).arg(ttl_seconds(ttl)).arg(value);
    cmd
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        get_cmd(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "redis GET failed");
                cache_error(format!("redis get failed: {}", e))
            })
    }

    async fn set_with_expiry(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        setex_cmd(key, value, ttl)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "redis SETEX failed");
                cache_error(format!("redis setex failed: {}", e))
            })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
