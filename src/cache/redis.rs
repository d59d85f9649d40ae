//! Redis connection wrapper shared by the distributed lock, console session
//! registry, hot-tier history ring, and command replay-suppression cache.
//!
//! Pattern adapted from the store-abstraction shape in the corpus's
//! Valkey-backed `Store` trait implementation: a thin wrapper around a
//! `ConnectionManager` (auto-reconnecting, safe to clone and share) rather
//! than a raw `Connection`.

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::info;

use crate::config::CacheArgs;
use crate::types::{GridkeepError, Result};

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCache {
    pub async fn connect(args: &CacheArgs) -> Result<Self> {
        info!("Connecting to Redis at {}", args.redis_url);
        let client = Client::open(args.redis_url.as_str())
            .map_err(|e| GridkeepError::Cache(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| GridkeepError::Cache(format!("failed to connect: {e}")))?;
        info!("Connected to Redis");
        Ok(Self {
            manager,
            key_prefix: args.key_prefix.clone(),
        })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}
