//! Console hot-tier history (§4.G): a TTL'd, capacity-capped ring per
//! server backed by a Redis list. When the ring exceeds capacity, the
//! oldest lines are popped and archived to the Postgres cold tier under a
//! distributed lock, so two server instances racing the same server's
//! archival never double-append the cold table.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::lock::DistributedLock;
use crate::cache::redis::RedisCache;
use crate::db::schemas::{ConsoleArchiveLine, ConsoleArchiveRepository};
use crate::metrics;
use crate::types::{GridkeepError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub sequence_number: i64,
    pub output_type: String,
    pub content: String,
    pub at: chrono::DateTime<Utc>,
}

pub struct ConsoleHistoryStore {
    cache: RedisCache,
    hot_ttl_secs: u64,
    hot_capacity: usize,
    archive_batch: usize,
    lock_ttl_secs: u64,
}

impl ConsoleHistoryStore {
    pub fn new(cache: RedisCache, hot_ttl_secs: u64, hot_capacity: usize, archive_batch: usize, lock_ttl_secs: u64) -> Self {
        Self {
            cache,
            hot_ttl_secs,
            hot_capacity,
            archive_batch,
            lock_ttl_secs,
        }
    }

    fn ring_key(&self, server_id: Uuid) -> String {
        self.cache.key(&["console", "hot", &server_id.to_string()])
    }

    fn sequence_key(&self, server_id: Uuid) -> String {
        self.cache.key(&["console", "seq", &server_id.to_string()])
    }

    /// Prepend a new line (newest at the head), refresh TTL, and archive
    /// the tail if the ring has grown past capacity.
    pub async fn append(
        &self,
        server_id: Uuid,
        tenant_id: Uuid,
        output_type: &str,
        content: &str,
        archive: &ConsoleArchiveRepository<'_>,
    ) -> Result<ConsoleLine> {
        let mut conn: ConnectionManager = self.cache.connection();
        let ring_key = self.ring_key(server_id);
        let seq_key = self.sequence_key(server_id);

        let sequence_number: i64 = conn
            .incr(&seq_key, 1)
            .await
            .map_err(|e| GridkeepError::Cache(format!("seq incr failed: {e}")))?;

        let line = ConsoleLine {
            sequence_number,
            output_type: output_type.to_string(),
            content: content.to_string(),
            at: Utc::now(),
        };
        let encoded = serde_json::to_string(&line)?;

        let _: () = redis::pipe()
            .atomic()
            .lpush(&ring_key, &encoded)
            .expire(&ring_key, self.hot_ttl_secs as i64)
            .query_async(&mut conn)
            .await
            .map_err(|e| GridkeepError::Cache(format!("lpush failed: {e}")))?;

        metrics::record_console_multicast(&server_id.to_string(), 0);

        let len: usize = conn
            .llen(&ring_key)
            .await
            .map_err(|e| GridkeepError::Cache(format!("llen failed: {e}")))?;

        if len > self.hot_capacity {
            self.archive_overflow(server_id, tenant_id, &ring_key, archive).await?;
        }

        Ok(line)
    }

    /// Move the oldest `archive_batch` lines to the cold tier under a
    /// distributed lock so only one instance performs the pop+insert at a
    /// time (§4.G: "prepend is distributed-lock-protected").
    async fn archive_overflow(
        &self,
        server_id: Uuid,
        tenant_id: Uuid,
        ring_key: &str,
        archive: &ConsoleArchiveRepository<'_>,
    ) -> Result<()> {
        let lock_key = self.cache.key(&["console", "archive-lock", &server_id.to_string()]);
        let lock = DistributedLock::try_acquire(
            self.cache.connection(),
            &lock_key,
            std::time::Duration::from_secs(self.lock_ttl_secs),
        )
        .await?;

        let Some(lock) = lock else {
            // Another instance is already archiving this server; skip.
            return Ok(());
        };

        let mut conn: ConnectionManager = self.cache.connection();
        let mut batch = Vec::new();
        for _ in 0..self.archive_batch {
            let raw: Option<String> = conn
                .rpop(ring_key, None)
                .await
                .map_err(|e| GridkeepError::Cache(format!("rpop failed: {e}")))?;
            let Some(raw) = raw else { break };
            if let Ok(line) = serde_json::from_str::<ConsoleLine>(&raw) {
                batch.push(ConsoleArchiveLine {
                    server_id,
                    sequence_number: line.sequence_number,
                    tenant_id,
                    output_type: line.output_type,
                    content: line.content,
                    at: line.at,
                });
            }
        }

        if !batch.is_empty() {
            let inserted = archive.insert_batch(&batch).await?;
            metrics::record_archive_batch(inserted);
        }

        lock.release().await
    }

    pub async fn recent(&self, server_id: Uuid, limit: isize) -> Result<Vec<ConsoleLine>> {
        let mut conn: ConnectionManager = self.cache.connection();
        let ring_key = self.ring_key(server_id);
        let raw: Vec<String> = conn
            .lrange(&ring_key, 0, limit.saturating_sub(1))
            .await
            .map_err(|e| GridkeepError::Cache(format!("lrange failed: {e}")))?;
        Ok(raw.iter().filter_map(|s| serde_json::from_str(s).ok()).collect())
    }
}
