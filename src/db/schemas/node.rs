//! Node entity and repository (§3 Data Model — Node).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{ErrorCode, GridkeepError, Result};

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LEN: usize = 50;
pub const MAX_WARNINGS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "PascalCase")]
#[serde(rename_all = "PascalCase")]
pub enum NodeStatus {
    Enrolling,
    Online,
    Degraded,
    Maintenance,
    Decommissioned,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrolling => "Enrolling",
            Self::Online => "Online",
            Self::Degraded => "Degraded",
            Self::Maintenance => "Maintenance",
            Self::Decommissioned => "Decommissioned",
            Self::Offline => "Offline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Enrolling" => Some(Self::Enrolling),
            "Online" => Some(Self::Online),
            "Degraded" => Some(Self::Degraded),
            "Maintenance" => Some(Self::Maintenance),
            "Decommissioned" => Some(Self::Decommissioned),
            "Offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HealthTrend {
    Up,
    Down,
    Flat,
}

impl HealthTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Flat => "Flat",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Up" => Self::Up,
            "Down" => Self::Down,
            _ => Self::Flat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

/// Row shape for the `nodes` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct NodeRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub platform: String,
    pub status: String,
    pub health_score: i16,
    pub health_trend: String,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub os_version: Option<String>,
    pub cpu_cores: Option<i32>,
    pub ram_bytes: Option<i64>,
    pub disk_bytes: Option<i64>,
    pub capacity_max_servers: Option<i32>,
    pub capacity_current_servers: Option<i32>,
    pub capacity_available_memory_bytes: Option<i64>,
    pub capacity_available_disk_bytes: Option<i64>,
    pub tags: Vec<String>,
    pub warnings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_str(&self.status).unwrap_or(NodeStatus::Offline)
    }

    pub fn is_decommissioned(&self) -> bool {
        matches!(self.status(), NodeStatus::Decommissioned)
    }

    pub fn warnings_vec(&self) -> Vec<String> {
        serde_json::from_value(self.warnings.clone()).unwrap_or_default()
    }
}

/// Normalizes a tag list per §3/§8: lowercase, deduplicated, ≤20 items of
/// ≤50 chars; beyond 20 the oldest is silently dropped (documented boundary
/// behavior, not an error).
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let normalized: String = tag.trim().to_lowercase().chars().take(MAX_TAG_LEN).collect();
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        out.push(normalized);
    }
    if out.len() > MAX_TAGS {
        let drop = out.len() - MAX_TAGS;
        out.drain(0..drop);
    }
    out
}

pub struct NodeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NodeRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        name: &str,
        platform: Platform,
    ) -> Result<NodeRecord> {
        let existing = sqlx::query_as::<_, NodeRecord>(
            "SELECT * FROM nodes WHERE tenant_id = $1 AND name = $2",
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        if existing.is_some() {
            return Err(GridkeepError::typed(
                ErrorCode::NameAlreadyExists,
                format!("Node name '{name}' already exists for this tenant"),
            ));
        }

        let record = sqlx::query_as::<_, NodeRecord>(
            r#"
            INSERT INTO nodes (id, tenant_id, name, platform, status, health_score, health_trend, tags, warnings)
            VALUES ($1, $2, $3, $4, 'Enrolling', 100, 'Flat', '{}', '[]')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(name)
        .bind(platform.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<NodeRecord>> {
        let record = sqlx::query_as::<_, NodeRecord>("SELECT * FROM nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(record)
    }

    /// Fetch a node scoped to a tenant; returns `None` on cross-tenant access
    /// so callers cannot distinguish "not found" from "not yours" (§3
    /// Ownership, §8 invariant 6).
    pub async fn get_scoped(&self, id: Uuid, tenant_id: Uuid) -> Result<Option<NodeRecord>> {
        let record =
            sqlx::query_as::<_, NodeRecord>("SELECT * FROM nodes WHERE id = $1 AND tenant_id = $2")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(record)
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<NodeStatus>,
        platform: Option<Platform>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NodeRecord>> {
        let rows = sqlx::query_as::<_, NodeRecord>(
            r#"
            SELECT * FROM nodes
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR platform = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(tenant_id)
        .bind(status.map(|s| s.as_str()))
        .bind(platform.map(|p| p.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Apply a heartbeat upsert: last-seen, declared status inputs, capacity,
    /// rolling health score/trend, and the bounded warning ring (§4.D).
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_heartbeat(
        &self,
        id: Uuid,
        observed_status: NodeStatus,
        health_score: u8,
        trend: HealthTrend,
        hostname: Option<&str>,
        os_version: Option<&str>,
        cpu_cores: Option<i32>,
        ram_bytes: Option<i64>,
        disk_bytes: Option<i64>,
        capacity_current_servers: Option<i32>,
        capacity_available_memory_bytes: Option<i64>,
        capacity_available_disk_bytes: Option<i64>,
        warnings: &[String],
    ) -> Result<NodeRecord> {
        let bounded_warnings: Vec<&String> = warnings.iter().rev().take(MAX_WARNINGS).collect();
        let warnings_json = serde_json::to_value(bounded_warnings)?;

        let record = sqlx::query_as::<_, NodeRecord>(
            r#"
            UPDATE nodes SET
                status = $2,
                health_score = $3,
                health_trend = $4,
                last_heartbeat_at = now(),
                hostname = COALESCE($5, hostname),
                os_version = COALESCE($6, os_version),
                cpu_cores = COALESCE($7, cpu_cores),
                ram_bytes = COALESCE($8, ram_bytes),
                disk_bytes = COALESCE($9, disk_bytes),
                capacity_current_servers = COALESCE($10, capacity_current_servers),
                capacity_available_memory_bytes = COALESCE($11, capacity_available_memory_bytes),
                capacity_available_disk_bytes = COALESCE($12, capacity_available_disk_bytes),
                warnings = $13,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(observed_status.as_str())
        .bind(health_score as i16)
        .bind(trend.as_str())
        .bind(hostname)
        .bind(os_version)
        .bind(cpu_cores)
        .bind(ram_bytes)
        .bind(disk_bytes)
        .bind(capacity_current_servers)
        .bind(capacity_available_memory_bytes)
        .bind(capacity_available_disk_bytes)
        .bind(warnings_json)
        .fetch_one(self.pool)
        .await?;

        Ok(record)
    }

    /// Remove a node row outright, used only to unwind a failed enrollment
    /// before the node was ever usable (§4.C step 6 compensating rollback).
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: NodeStatus) -> Result<()> {
        sqlx::query("UPDATE nodes SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_tags(&self, id: Uuid, tags: &[String]) -> Result<()> {
        let normalized = normalize_tags(tags);
        sqlx::query("UPDATE nodes SET tags = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(normalized)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Mark nodes whose last heartbeat is older than `offline_after` as
    /// `Offline`, excluding terminal/administrator-controlled states (§4.D
    /// step 4, §9 Maintenance/Decommissioned override derivation).
    pub async fn mark_stale_offline(&self, offline_after: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - offline_after;
        let result = sqlx::query(
            r#"
            UPDATE nodes SET status = 'Offline', updated_at = now()
            WHERE status IN ('Online', 'Degraded')
              AND (last_heartbeat_at IS NULL OR last_heartbeat_at < $1)
            "#,
        )
        .bind(cutoff)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_tags_dedupes_and_lowercases() {
        let tags = vec!["Prod".to_string(), "prod".to_string(), "eu-west".to_string()];
        let normalized = normalize_tags(&tags);
        assert_eq!(normalized, vec!["prod".to_string(), "eu-west".to_string()]);
    }

    #[test]
    fn normalize_tags_caps_at_twenty() {
        let tags: Vec<String> = (0..21).map(|i| format!("tag{i}")).collect();
        let normalized = normalize_tags(&tags);
        assert_eq!(normalized.len(), MAX_TAGS);
        // Oldest (tag0) silently dropped (§8 boundary behavior).
        assert!(!normalized.contains(&"tag0".to_string()));
        assert!(normalized.contains(&"tag20".to_string()));
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!(Platform::from_str("Linux"), Some(Platform::Linux));
        assert_eq!(Platform::from_str("WINDOWS"), Some(Platform::Windows));
        assert_eq!(Platform::from_str("macos"), None);
    }
}
