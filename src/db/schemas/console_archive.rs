//! Cold-tier console history (§4.G, §6 retention sweep).
//!
//! Hot-tier lines live in Redis (see `cache::console_history`); once a line
//! ages out of the ring it is archived here by batch, and a standalone
//! sweeper binary bulk-deletes rows past the retention window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Result;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ConsoleArchiveLine {
    pub server_id: Uuid,
    pub sequence_number: i64,
    pub tenant_id: Uuid,
    pub output_type: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

pub struct ConsoleArchiveRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ConsoleArchiveRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Bulk-insert a batch of lines evicted from the hot-tier ring. Uses
    /// `ON CONFLICT DO NOTHING` since archival can race a concurrent retry
    /// after a partial failure (§4.G: archival is at-least-once, storage is
    /// idempotent on `(server_id, sequence_number)`).
    pub async fn insert_batch(&self, lines: &[ConsoleArchiveLine]) -> Result<usize> {
        if lines.is_empty() {
            return Ok(0);
        }
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for line in lines {
            let result = sqlx::query(
                r#"
                INSERT INTO console_archive (server_id, sequence_number, tenant_id, output_type, content, at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (server_id, sequence_number) DO NOTHING
                "#,
            )
            .bind(line.server_id)
            .bind(line.sequence_number)
            .bind(line.tenant_id)
            .bind(&line.output_type)
            .bind(&line.content)
            .bind(line.at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Range query used when a console viewer scrolls back past what the
    /// hot-tier ring retains (§4.G "history replay crosses both tiers").
    pub async fn range(
        &self,
        server_id: Uuid,
        from_sequence: i64,
        limit: i64,
    ) -> Result<Vec<ConsoleArchiveLine>> {
        let rows = sqlx::query_as::<_, ConsoleArchiveLine>(
            r#"
            SELECT * FROM console_archive
            WHERE server_id = $1 AND sequence_number >= $2
            ORDER BY sequence_number ASC
            LIMIT $3
            "#,
        )
        .bind(server_id)
        .bind(from_sequence)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Retention sweep: delete archived lines older than `retain_for`.
    /// Invoked by the standalone sweeper binary, not the main server loop.
    pub async fn delete_older_than(&self, retain_for: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - retain_for;
        let result = sqlx::query("DELETE FROM console_archive WHERE at < $1")
            .bind(cutoff)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
