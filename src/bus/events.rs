//! Bus event contracts (§2, §4 cross-component notifications).
//!
//! Each event is published on a subject namespaced `gridkeep.events.<kind>`
//! and carries just enough to let a subscriber decide whether to re-fetch
//! the authoritative row from Postgres — these are notifications, not a
//! replicated data feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::schemas::{CommandStatus, NodeStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChanged {
    pub node_id: Uuid,
    pub tenant_id: Uuid,
    pub previous_status: NodeStatus,
    pub new_status: NodeStatus,
    pub health_score: u8,
    pub at: DateTime<Utc>,
}

impl HealthChanged {
    pub const SUBJECT: &'static str = "gridkeep.events.health_changed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandCompleted {
    pub command_id: Uuid,
    pub node_id: Uuid,
    pub command_type: String,
    pub status: CommandStatus,
    pub correlation_id: Uuid,
    pub at: DateTime<Utc>,
}

impl CommandCompleted {
    pub const SUBJECT: &'static str = "gridkeep.events.command_completed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCertificateIssued {
    pub node_id: Uuid,
    pub thumbprint: String,
    pub not_after: DateTime<Utc>,
}

impl AgentCertificateIssued {
    pub const SUBJECT: &'static str = "gridkeep.events.certificate_issued";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCertificateRevoked {
    pub node_id: Uuid,
    pub thumbprint: String,
    pub reason: String,
}

impl AgentCertificateRevoked {
    pub const SUBJECT: &'static str = "gridkeep.events.certificate_revoked";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCertificateRenewed {
    pub node_id: Uuid,
    pub old_thumbprint: String,
    pub new_thumbprint: String,
}

impl AgentCertificateRenewed {
    pub const SUBJECT: &'static str = "gridkeep.events.certificate_renewed";
}

/// Published so the owning node agent picks up and executes a dispatched
/// command (§4.E, §4.H). `CommandDispatcher` only validates, audits, and
/// records outcome; actual execution happens on the node, out-of-process,
/// once it consumes this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandIssued {
    pub node_id: Uuid,
    pub command_type: String,
    pub payload: String,
    pub correlation_id: Uuid,
    pub at: DateTime<Utc>,
}

impl CommandIssued {
    pub const SUBJECT: &'static str = "gridkeep.commands.issued";
}

/// Published when console output arrives from an agent, ahead of hub
/// fan-out — lets a cold observer (e.g. an alerting pipeline) consume the
/// stream without holding a websocket subscription open (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleOutputReceived {
    pub server_id: Uuid,
    pub tenant_id: Uuid,
    pub sequence_number: i64,
    pub output_type: String,
    pub at: DateTime<Utc>,
}

impl ConsoleOutputReceived {
    pub const SUBJECT: &'static str = "gridkeep.events.console_output";
}
