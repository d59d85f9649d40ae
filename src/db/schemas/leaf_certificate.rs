//! Leaf certificate record and repository (§3 Leaf Certificate, §4.B).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Result;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LeafCertificateRecord {
    pub id: Uuid,
    pub node_id: Uuid,
    pub thumbprint: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeafCertificateRecord {
    pub fn is_valid_now(&self) -> bool {
        let now = Utc::now();
        !self.revoked && self.not_before <= now && now < self.not_after
    }
}

pub struct LeafCertificateRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LeafCertificateRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a newly issued leaf certificate. The partial unique index on
    /// `(node_id) WHERE NOT revoked` enforces the at-most-one-active
    /// invariant; callers must revoke the prior cert first (§4.B RenewCertificate).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        id: Uuid,
        node_id: Uuid,
        thumbprint: &str,
        serial: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<LeafCertificateRecord> {
        let record = sqlx::query_as::<_, LeafCertificateRecord>(
            r#"
            INSERT INTO leaf_certificates (id, node_id, thumbprint, serial, not_before, not_after, revoked)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(node_id)
        .bind(thumbprint)
        .bind(serial)
        .bind(not_before)
        .bind(not_after)
        .fetch_one(self.pool)
        .await?;
        Ok(record)
    }

    pub async fn active_for_node(&self, node_id: Uuid) -> Result<Option<LeafCertificateRecord>> {
        let record = sqlx::query_as::<_, LeafCertificateRecord>(
            "SELECT * FROM leaf_certificates WHERE node_id = $1 AND NOT revoked",
        )
        .bind(node_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    pub async fn by_thumbprint(&self, thumbprint: &str) -> Result<Option<LeafCertificateRecord>> {
        let record = sqlx::query_as::<_, LeafCertificateRecord>(
            "SELECT * FROM leaf_certificates WHERE thumbprint = $1",
        )
        .bind(thumbprint)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    pub async fn revoke(&self, id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE leaf_certificates SET revoked = TRUE, revoked_at = now(), revocation_reason = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_active_for_node(&self, node_id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE leaf_certificates SET revoked = TRUE, revoked_at = now(), revocation_reason = $2 WHERE node_id = $1 AND NOT revoked",
        )
        .bind(node_id)
        .bind(reason)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
