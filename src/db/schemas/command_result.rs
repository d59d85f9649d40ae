//! Command result record and repository (§3 Command Result, §4.E).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "PascalCase")]
#[serde(rename_all = "PascalCase")]
pub enum CommandStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Rejected,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled | Self::Rejected)
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Running" => Some(Self::Running),
            "Succeeded" => Some(Self::Succeeded),
            "Failed" => Some(Self::Failed),
            "Cancelled" => Some(Self::Cancelled),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CommandResultRecord {
    pub command_id: Uuid,
    pub node_id: Uuid,
    pub command_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub correlation_id: Uuid,
}

pub struct CommandResultRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CommandResultRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        command_id: Uuid,
        node_id: Uuid,
        command_type: &str,
        payload: &serde_json::Value,
        correlation_id: Uuid,
    ) -> Result<CommandResultRecord> {
        let record = sqlx::query_as::<_, CommandResultRecord>(
            r#"
            INSERT INTO command_results (command_id, node_id, command_type, payload, status, started_at, correlation_id)
            VALUES ($1, $2, $3, $4, 'Pending', now(), $5)
            RETURNING *
            "#,
        )
        .bind(command_id)
        .bind(node_id)
        .bind(command_type)
        .bind(payload)
        .bind(correlation_id)
        .fetch_one(self.pool)
        .await?;
        Ok(record)
    }

    /// Looked up on every dispatch to decide whether this is a replay (§4.E
    /// 24h idempotency window). Returns the stored result verbatim; callers
    /// re-emit it annotated as a replay rather than re-running the command.
    pub async fn get(&self, command_id: Uuid) -> Result<Option<CommandResultRecord>> {
        let record =
            sqlx::query_as::<_, CommandResultRecord>("SELECT * FROM command_results WHERE command_id = $1")
                .bind(command_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(record)
    }

    pub async fn recent_within(
        &self,
        command_id: Uuid,
        window: chrono::Duration,
    ) -> Result<Option<CommandResultRecord>> {
        let cutoff = Utc::now() - window;
        let record = sqlx::query_as::<_, CommandResultRecord>(
            "SELECT * FROM command_results WHERE command_id = $1 AND started_at >= $2",
        )
        .bind(command_id)
        .bind(cutoff)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    pub async fn complete(
        &self,
        command_id: Uuid,
        status: CommandStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE command_results SET
                status = $2,
                completed_at = now(),
                error_code = $3,
                error_message = $4
            WHERE command_id = $1
            "#,
        )
        .bind(command_id)
        .bind(status.as_str())
        .bind(error_code)
        .bind(error_message)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_node(&self, node_id: Uuid, limit: i64) -> Result<Vec<CommandResultRecord>> {
        let rows = sqlx::query_as::<_, CommandResultRecord>(
            "SELECT * FROM command_results WHERE node_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(node_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
