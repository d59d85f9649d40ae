//! Audit record and repository (§3 Audit Record, §4.E, §7).
//!
//! Every privileged mutation — enrollment, revocation, command dispatch,
//! maintenance toggles — writes one row here. Append-only, never updated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Replay,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Replay => "replay",
            Self::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub actor: String,
    pub tenant_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: String,
    pub correlation_id: Uuid,
    pub detail: String,
}

pub struct AuditRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        actor: &str,
        tenant_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        outcome: AuditOutcome,
        correlation_id: Uuid,
        detail: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (id, actor, tenant_id, action, resource_type, resource_id, outcome, correlation_id, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor)
        .bind(tenant_id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(outcome.as_str())
        .bind(correlation_id)
        .bind(detail)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_tenant(&self, tenant_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_records WHERE tenant_id = $1 ORDER BY at DESC LIMIT $2",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_correlation(&self, correlation_id: Uuid) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecord>(
            "SELECT * FROM audit_records WHERE correlation_id = $1 ORDER BY at ASC",
        )
        .bind(correlation_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
