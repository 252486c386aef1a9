//! Response cache. Redis in production; every caller treats it as best-effort.

use std::time::Duration;

use async_trait::async_trait;
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};
use tracing::{info, warn};

use crate::config::CACHE_KEY_PREFIX;
use crate::error::Result;
use crate::types::Language;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait PriceCache: Send + Sync {
    /// False when no connection was ever established; callers skip the cache entirely.
    fn is_open(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()>;

    /// Deletes every key matching a glob `pattern`, returning how many went away.
    async fn delete_matching(&self, pattern: &str) -> Result<usize>;

    /// Round-trip liveness check.
    async fn ping(&self) -> bool;
}

/// `market:{crop}:{lat},{lon}:far={bool}:lang={code}` with coordinates at 4 decimals.
pub fn market_cache_key(
    crop: &str,
    lat: f64,
    lon: f64,
    include_far: bool,
    language: Language,
) -> String {
    format!(
        "{CACHE_KEY_PREFIX}:{}:{lat:.4},{lon:.4}:far={include_far}:lang={}",
        crop.trim().to_lowercase(),
        language.code(),
    )
}

pub struct RedisCache {
    conn: Option<ConnectionManager>,
}

impl RedisCache {
    /// Never fails: an unreachable Redis yields a closed cache and the service
    /// keeps answering from upstream sources.
    pub async fn connect(redis_url: &str) -> Self {
        match Self::try_connect(redis_url).await {
            Ok(conn) => {
                info!("Redis connected at {redis_url}");
                Self { conn: Some(conn) }
            }
            Err(e) => {
                warn!("Redis unavailable at {redis_url}, caching disabled: {e}");
                Self::disconnected()
            }
        }
    }

    pub fn disconnected() -> Self {
        Self { conn: None }
    }

    async fn try_connect(redis_url: &str) -> Result<ConnectionManager> {
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);
        let client = Client::open(redis_url)?;
        let manager = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client.get_connection_manager_with_config(config),
        )
        .await
        .map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "Redis connection timed out")
        })??;
        Ok(manager)
    }
}

#[async_trait]
impl PriceCache for RedisCache {
    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(conn) = &self.conn else { return Ok(None) };
        let mut conn = conn.clone();
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()> {
        let Some(conn) = &self.conn else { return Ok(()) };
        let mut conn = conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let Some(conn) = &self.conn else { return Ok(0) };
        let mut conn = conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted: usize = conn.del(&keys).await?;
        Ok(deleted)
    }

    async fn ping(&self) -> bool {
        let Some(conn) = &self.conn else { return false };
        let mut conn = conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
    }
}
