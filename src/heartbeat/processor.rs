//! Heartbeat ingestion (§4.D). Maintains a short in-process rolling window
//! of recent samples per node (capacity bounded by `health_score_window`)
//! and a background sweep that marks stale nodes offline, mirroring the
//! publish/monitor loop shape of `hosts::heartbeat::HeartbeatService` but
//! on the receiving side of the protocol.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bus::{events::HealthChanged, BusClient};
use crate::db::schemas::{NodeRecord, NodeRepository};
use crate::heartbeat::health::{derive_status, derive_trend, rolling_score, HeartbeatSample};
use crate::metrics;
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct HeartbeatRequest {
    pub node_id: Uuid,
    pub sample: HeartbeatSample,
    pub hostname: Option<String>,
    pub os_version: Option<String>,
    pub cpu_cores: Option<i32>,
    pub ram_bytes: Option<i64>,
    pub disk_bytes: Option<i64>,
    pub capacity_current_servers: Option<i32>,
    pub capacity_available_memory_bytes: Option<i64>,
    pub capacity_available_disk_bytes: Option<i64>,
    pub warnings: Vec<String>,
}

pub struct HeartbeatProcessor {
    pool: sqlx::PgPool,
    bus: Option<BusClient>,
    score_window: usize,
    trend_window: usize,
    disk_degraded_pct: f64,
    health_degraded_below: u8,
    offline_after: Duration,
    samples: DashMap<Uuid, VecDeque<HeartbeatSample>>,
    scores: DashMap<Uuid, VecDeque<u8>>,
}

impl HeartbeatProcessor {
    pub fn new(
        pool: sqlx::PgPool,
        bus: Option<BusClient>,
        score_window: usize,
        trend_window: usize,
        disk_degraded_pct: f64,
        health_degraded_below: u8,
        offline_after: Duration,
    ) -> Self {
        Self {
            pool,
            bus,
            score_window,
            trend_window,
            disk_degraded_pct,
            health_degraded_below,
            offline_after,
            samples: DashMap::new(),
            scores: DashMap::new(),
        }
    }

    /// Process one heartbeat: fold it into the rolling window, persist the
    /// derived status/score/trend, and emit a `HealthChanged` event when
    /// the derived status actually changes (§4.D steps 1-3).
    pub async fn process(&self, tenant_id: Uuid, req: HeartbeatRequest) -> Result<NodeRecord> {
        let mut window = self.samples.entry(req.node_id).or_default();
        window.push_back(req.sample);
        while window.len() > self.score_window {
            window.pop_front();
        }
        let score = rolling_score(window.make_contiguous());
        drop(window);

        let mut score_history = self.scores.entry(req.node_id).or_default();
        score_history.push_back(score);
        while score_history.len() > self.trend_window {
            score_history.pop_front();
        }
        let trend = derive_trend(score_history.make_contiguous());
        drop(score_history);

        let repo = NodeRepository::new(&self.pool);
        let existing = repo.get_scoped(req.node_id, tenant_id).await?;
        let Some(existing) = existing else {
            return Err(crate::types::GridkeepError::typed(
                crate::types::ErrorCode::NodeNotFound,
                "node not found for this tenant".to_string(),
            ));
        };
        let previous_status = existing.status();

        let new_status = derive_status(
            previous_status,
            score,
            req.sample.disk_pct,
            !req.warnings.is_empty(),
            self.health_degraded_below,
            self.disk_degraded_pct,
        );

        let updated = repo
            .apply_heartbeat(
                req.node_id,
                new_status,
                score,
                trend,
                req.hostname.as_deref(),
                req.os_version.as_deref(),
                req.cpu_cores,
                req.ram_bytes,
                req.disk_bytes,
                req.capacity_current_servers,
                req.capacity_available_memory_bytes,
                req.capacity_available_disk_bytes,
                &req.warnings,
            )
            .await?;

        metrics::record_heartbeat(previous_status.as_str(), new_status.as_str());

        if previous_status != new_status {
            if let Some(bus) = &self.bus {
                let event = HealthChanged {
                    node_id: req.node_id,
                    tenant_id,
                    previous_status,
                    new_status,
                    health_score: score,
                    at: chrono::Utc::now(),
                };
                if let Err(e) = bus.publish_json(HealthChanged::SUBJECT, &event).await {
                    warn!("failed to publish HealthChanged: {e}");
                }
            }
        }

        Ok(updated)
    }

    pub fn forget(&self, node_id: Uuid) {
        self.samples.remove(&node_id);
        self.scores.remove(&node_id);
    }

    /// Background sweep marking nodes stale-offline, spawned once at
    /// startup alongside the HTTP listener (§4.D step 4).
    pub fn spawn_stale_sweep(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let repo = NodeRepository::new(&self.pool);
                match repo.mark_stale_offline(chrono::Duration::from_std(self.offline_after).unwrap_or_default()).await {
                    Ok(count) if count > 0 => info!("marked {count} stale nodes offline"),
                    Ok(_) => {}
                    Err(e) => error!("stale-node sweep failed: {e}"),
                }
            }
        });
    }
}
