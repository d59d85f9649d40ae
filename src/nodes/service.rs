//! Node lifecycle operations exposed to tenant operators (§3 Node, §4.D):
//! list/filter, tagging, maintenance toggling, decommissioning. Backed by
//! Postgres rather than the teacher's MongoDB `HostRegistry`, but keeps the
//! same registry-over-repository shape.

use uuid::Uuid;

use crate::bus::BusClient;
use crate::db::schemas::{NodeRecord, NodeRepository, NodeStatus, Platform};
use crate::types::{ErrorCode, GridkeepError, Result};

pub struct NodeService {
    pool: sqlx::PgPool,
    #[allow(dead_code)]
    bus: Option<BusClient>,
}

impl NodeService {
    pub fn new(pool: sqlx::PgPool, bus: Option<BusClient>) -> Self {
        Self { pool, bus }
    }

    pub async fn get(&self, tenant_id: Uuid, node_id: Uuid) -> Result<NodeRecord> {
        NodeRepository::new(&self.pool)
            .get_scoped(node_id, tenant_id)
            .await?
            .ok_or_else(|| GridkeepError::typed(ErrorCode::NodeNotFound, "node not found".to_string()))
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<NodeStatus>,
        platform: Option<Platform>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NodeRecord>> {
        NodeRepository::new(&self.pool)
            .list(tenant_id, status, platform, limit, offset)
            .await
    }

    pub async fn set_tags(&self, tenant_id: Uuid, node_id: Uuid, tags: &[String]) -> Result<NodeRecord> {
        let repo = NodeRepository::new(&self.pool);
        self.get(tenant_id, node_id).await?;
        repo.set_tags(node_id, tags).await?;
        self.get(tenant_id, node_id).await
    }

    /// Enter maintenance (§4.D: blocks new command dispatch and heartbeat
    /// derived status from overriding the administrator's choice).
    pub async fn enter_maintenance(&self, tenant_id: Uuid, node_id: Uuid) -> Result<NodeRecord> {
        let node = self.get(tenant_id, node_id).await?;
        if node.is_decommissioned() {
            return Err(GridkeepError::typed(ErrorCode::NodeDecommissioned, "node is decommissioned".to_string()));
        }
        if matches!(node.status(), NodeStatus::Maintenance) {
            return Err(GridkeepError::typed(ErrorCode::AlreadyInMaintenance, "node is already in maintenance".to_string()));
        }
        NodeRepository::new(&self.pool).set_status(node_id, NodeStatus::Maintenance).await?;
        self.get(tenant_id, node_id).await
    }

    pub async fn exit_maintenance(&self, tenant_id: Uuid, node_id: Uuid) -> Result<NodeRecord> {
        let node = self.get(tenant_id, node_id).await?;
        if !matches!(node.status(), NodeStatus::Maintenance) {
            return Err(GridkeepError::typed(ErrorCode::NotInMaintenance, "node is not in maintenance".to_string()));
        }
        NodeRepository::new(&self.pool).set_status(node_id, NodeStatus::Offline).await?;
        self.get(tenant_id, node_id).await
    }

    /// Decommission is terminal: no further heartbeats, commands, or
    /// maintenance transitions are accepted once set (§3 invariant).
    pub async fn decommission(&self, tenant_id: Uuid, node_id: Uuid) -> Result<NodeRecord> {
        let node = self.get(tenant_id, node_id).await?;
        if node.is_decommissioned() {
            return Err(GridkeepError::typed(ErrorCode::NodeDecommissioned, "node is already decommissioned".to_string()));
        }
        NodeRepository::new(&self.pool).set_status(node_id, NodeStatus::Decommissioned).await?;
        self.get(tenant_id, node_id).await
    }
}
