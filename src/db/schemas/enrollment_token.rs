//! Enrollment token record and repository (§3 Enrollment Token, §4.C).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{ErrorCode, GridkeepError, Result};

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct EnrollmentTokenRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub label: Option<String>,
    #[serde(skip)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumer_node_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl EnrollmentTokenRecord {
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

pub struct EnrollmentTokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> EnrollmentTokenRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        label: Option<&str>,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<EnrollmentTokenRecord> {
        let record = sqlx::query_as::<_, EnrollmentTokenRecord>(
            r#"
            INSERT INTO enrollment_tokens (id, tenant_id, label, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(label)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;
        Ok(record)
    }

    /// Tokens are presented as `{id}.{secret}` (§4.C) precisely so lookup
    /// doesn't require scanning every row's Argon2id hash for a match.
    pub async fn get(&self, id: Uuid) -> Result<Option<EnrollmentTokenRecord>> {
        let record = sqlx::query_as::<_, EnrollmentTokenRecord>(
            "SELECT * FROM enrollment_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    /// Atomically mark a token consumed, guarding single-use under concurrent
    /// redemption attempts (§4.C, §8 invariant: a token enrolls at most one
    /// node). The `WHERE consumed_at IS NULL` clause makes this a
    /// compare-and-swap at the row level; callers must check `rows_affected`.
    pub async fn try_consume(&self, id: Uuid, node_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE enrollment_tokens SET consumed_at = now(), consumer_node_id = $2 WHERE id = $1 AND consumed_at IS NULL",
        )
        .bind(id)
        .bind(node_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Undo a `try_consume` as a compensating action when enrollment fails
    /// after the token was redeemed but before it completed (§4.C step 6).
    pub async fn reset(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE enrollment_tokens SET consumed_at = NULL, consumer_node_id = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke(&self, id: Uuid, tenant_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM enrollment_tokens WHERE id = $1 AND tenant_id = $2 AND consumed_at IS NULL",
        )
        .bind(id)
        .bind(tenant_id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(GridkeepError::typed(
                ErrorCode::InvalidToken,
                "Token not found, already consumed, or not owned by this tenant".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<EnrollmentTokenRecord>> {
        let rows = sqlx::query_as::<_, EnrollmentTokenRecord>(
            "SELECT * FROM enrollment_tokens WHERE tenant_id = $1 ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
