//! Command replay-suppression cache (§4.E, §6): a fast Redis-backed
//! first-seen check in front of the authoritative Postgres `command_results`
//! row. A cache miss always falls through to Postgres before concluding a
//! command is new — Redis here is a latency optimization, not the source of
//! truth, so an evicted cache entry never causes a real replay to re-execute.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::cache::redis::RedisCache;
use crate::types::{GridkeepError, Result};

pub struct ReplayCache {
    cache: RedisCache,
    window_secs: u64,
}

impl ReplayCache {
    pub fn new(cache: RedisCache, window_secs: u64) -> Self {
        Self { cache, window_secs }
    }

    fn key(&self, command_id: Uuid) -> String {
        self.cache.key(&["command", "seen", &command_id.to_string()])
    }

    /// Mark a command id as seen for the replay window. Returns `true` if
    /// this is the first time it's been marked (i.e. not a known replay),
    /// `false` if the cache already held it.
    pub async fn mark_first_seen(&self, command_id: Uuid) -> Result<bool> {
        let mut conn: ConnectionManager = self.cache.connection();
        let key = self.key(command_id);
        let first: bool = conn
            .set_nx(&key, "1")
            .await
            .map_err(|e| GridkeepError::Cache(format!("replay mark failed: {e}")))?;
        if first {
            let _: () = conn
                .expire(&key, self.window_secs as i64)
                .await
                .map_err(|e| GridkeepError::Cache(format!("replay expire failed: {e}")))?;
        }
        Ok(first)
    }
}
