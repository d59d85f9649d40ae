//! Console Fan-out Hub (§4.H): per-connection join/leave/send-command/ping,
//! and the upstream multicast path from `ConsoleOutputReceived` bus events.
//!
//! Multicast uses a `tokio::sync::broadcast` channel per server, the same
//! coalescing-by-key shape `cache::delivery_relay` uses for in-flight read
//! requests, generalized here from "one response, many waiters" to "many
//! lines, many subscribers".

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::cache::console_history::{ConsoleHistoryStore, ConsoleLine};
use crate::cache::session_registry::SessionRegistry;
use crate::command::{CommandDispatcher, CommandEnvelope};
use crate::console::sanitize::CommandSanitizer;
use crate::context::Cancellation;
use crate::db::schemas::{AuditOutcome, AuditRepository, ConsoleArchiveRepository};
use crate::metrics;
use crate::types::{ErrorCode, GridkeepError, Result};

const JOIN_HISTORY_LINES: isize = 100;

#[derive(Debug, Clone)]
pub enum HubEvent {
    ConsoleOutput(ConsoleLine),
    Lossy,
}

pub struct ConsoleHub {
    pool: sqlx::PgPool,
    registry: SessionRegistry,
    history: ConsoleHistoryStore,
    sanitizer: CommandSanitizer,
    dispatcher: Arc<CommandDispatcher>,
    channels: DashMap<Uuid, broadcast::Sender<HubEvent>>,
    server_tenants: DashMap<Uuid, Uuid>,
    queue_capacity: usize,
    session_ttl_secs: u64,
}

impl ConsoleHub {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: sqlx::PgPool,
        registry: SessionRegistry,
        history: ConsoleHistoryStore,
        sanitizer: CommandSanitizer,
        dispatcher: Arc<CommandDispatcher>,
        queue_capacity: usize,
        session_ttl_secs: u64,
    ) -> Self {
        Self {
            pool,
            registry,
            history,
            sanitizer,
            dispatcher,
            channels: DashMap::new(),
            server_tenants: DashMap::new(),
            queue_capacity,
            session_ttl_secs,
        }
    }

    fn channel(&self, server_id: Uuid) -> broadcast::Sender<HubEvent> {
        self.channels
            .entry(server_id)
            .or_insert_with(|| broadcast::channel(self.queue_capacity).0)
            .clone()
    }

    /// `JoinServer`: authorize tenant ownership, register the membership,
    /// and reply with up-to-100 recent lines from the hot tier.
    pub async fn join_server(
        &self,
        connection_id: Uuid,
        server_id: Uuid,
        operator_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(broadcast::Receiver<HubEvent>, Vec<ConsoleLine>)> {
        if let Some(known_tenant) = self.server_tenants.get(&server_id) {
            if *known_tenant != tenant_id {
                AuditRepository::new(&self.pool)
                    .record(
                        &operator_id.to_string(),
                        tenant_id,
                        "console.join_server",
                        "server",
                        &server_id.to_string(),
                        AuditOutcome::Denied,
                        Uuid::new_v4(),
                        "operator's tenant does not own this server",
                    )
                    .await?;
                return Err(GridkeepError::typed(ErrorCode::TenantMismatch, "server belongs to a different tenant".to_string()));
            }
        }

        self.registry.subscribe(connection_id, server_id, operator_id, self.session_ttl_secs).await?;
        let recent = self.history.recent(server_id, JOIN_HISTORY_LINES).await?;
        let receiver = self.channel(server_id).subscribe();
        Ok((receiver, recent))
    }

    pub async fn leave_server(&self, connection_id: Uuid, server_id: Uuid) -> Result<()> {
        self.registry.unsubscribe(connection_id, server_id).await
    }

    pub async fn disconnect(&self, connection_id: Uuid) -> Result<()> {
        self.registry.disconnect(connection_id).await
    }

    /// `SendCommand`: sanitize, audit (including blocks), then dispatch.
    pub async fn send_command(
        &self,
        server_id: Uuid,
        operator_id: Uuid,
        tenant_id: Uuid,
        correlation_id: Uuid,
        node_id: Uuid,
        raw_command: &str,
        cancellation: Cancellation,
    ) -> Result<()> {
        let audit = AuditRepository::new(&self.pool);
        if let Err(err) = self.sanitizer.check(raw_command).await {
            audit
                .record(
                    &operator_id.to_string(),
                    tenant_id,
                    "console.send_command",
                    "server",
                    &server_id.to_string(),
                    AuditOutcome::Denied,
                    correlation_id,
                    &err.to_string(),
                )
                .await?;
            return Err(err);
        }

        audit
            .record(
                &operator_id.to_string(),
                tenant_id,
                "console.send_command",
                "server",
                &server_id.to_string(),
                AuditOutcome::Success,
                correlation_id,
                raw_command,
            )
            .await?;

        let envelope = CommandEnvelope {
            command_id: Uuid::new_v4(),
            node_id: Some(node_id),
            command_type: "console_command".to_string(),
            payload: serde_json::json!({ "server_id": server_id, "raw_command": raw_command }).to_string(),
            correlation_id,
            tenant_id,
            operator_id,
        };

        self.dispatcher.dispatch(envelope, Some(node_id), cancellation).await?;
        Ok(())
    }

    /// Upstream path: a `ConsoleOutputReceived` line arrives from a node via
    /// the bus. Append to the hot tier, then multicast to every subscriber;
    /// a subscriber whose queue is full is marked lossy rather than blocking
    /// the others (§5 Backpressure).
    pub async fn on_console_output(&self, server_id: Uuid, tenant_id: Uuid, output_type: &str, content: &str) -> Result<()> {
        self.server_tenants.entry(server_id).or_insert(tenant_id);

        let archive_repo = ConsoleArchiveRepository::new(&self.pool);
        let line = self.history.append(server_id, tenant_id, output_type, content, &archive_repo).await?;

        let sender = self.channel(server_id);
        let subscriber_count = sender.receiver_count();
        // No active receivers is not an error; lagging receivers detect
        // drops themselves on next recv() and mark their own session lossy.
        let _ = sender.send(HubEvent::ConsoleOutput(line));
        metrics::record_console_multicast(&server_id.to_string(), subscriber_count);
        Ok(())
    }
}
