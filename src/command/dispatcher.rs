//! Command Envelope Validator & Dispatcher (§4.E): ties together structural
//! validation, the handler registry, replay suppression, rate limiting,
//! audit logging, and bus event emission.

use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::bus::events::CommandCompleted;
use crate::bus::BusClient;
use crate::cache::replay::ReplayCache;
use crate::command::envelope::{validate, CommandEnvelope};
use crate::command::rate_limit::RateLimiter;
use crate::command::registry::{HandlerContext, HandlerRegistry};
use crate::context::Cancellation;
use crate::db::schemas::{AuditOutcome, AuditRepository, CommandResultRepository, CommandStatus};
use crate::metrics;
use crate::types::{ErrorCode, GridkeepError, Result};

const REPLAY_WINDOW_HOURS: i64 = 24;

pub struct DispatchOutcome {
    pub status: CommandStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub replayed: bool,
}

pub struct CommandDispatcher {
    pool: PgPool,
    bus: Option<BusClient>,
    registry: HandlerRegistry,
    replay_cache: ReplayCache,
    rate_limiter: RateLimiter,
}

impl CommandDispatcher {
    pub fn new(
        pool: PgPool,
        bus: Option<BusClient>,
        registry: HandlerRegistry,
        replay_cache: ReplayCache,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            pool,
            bus,
            registry,
            replay_cache,
            rate_limiter,
        }
    }

    pub async fn dispatch(
        &self,
        envelope: CommandEnvelope,
        bound_node_id: Option<Uuid>,
        cancellation: Cancellation,
    ) -> Result<DispatchOutcome> {
        let result_repo = CommandResultRepository::new(&self.pool);
        let audit_repo = AuditRepository::new(&self.pool);

        let validated = match validate(&envelope, bound_node_id) {
            Ok(v) => v,
            Err(err) => {
                let (code, message) = rejection_parts(&err);
                audit_repo
                    .record(
                        &envelope.operator_id.to_string(),
                        envelope.tenant_id,
                        "command.dispatch",
                        "command",
                        &envelope.command_id.to_string(),
                        AuditOutcome::Failure,
                        envelope.correlation_id,
                        &message,
                    )
                    .await?;
                metrics::record_command_dispatch(&envelope.command_type, false);
                return Ok(DispatchOutcome {
                    status: CommandStatus::Rejected,
                    error_code: Some(code),
                    error_message: Some(message),
                    replayed: false,
                });
            }
        };

        let now = chrono::Utc::now().timestamp() as u64;
        if !self.rate_limiter.check_and_record(validated.node_id, now) {
            let message = "command rate limit exceeded for this node".to_string();
            audit_repo
                .record(
                    &validated.operator_id.to_string(),
                    validated.tenant_id,
                    "command.dispatch",
                    "command",
                    &validated.command_id.to_string(),
                    AuditOutcome::Failure,
                    validated.correlation_id,
                    &message,
                )
                .await?;
            metrics::record_command_dispatch(&validated.command_type, false);
            return Ok(DispatchOutcome {
                status: CommandStatus::Rejected,
                error_code: Some(ErrorCode::RateLimited.as_str().to_string()),
                error_message: Some(message),
                replayed: false,
            });
        }

        // Replay suppression (§4.E): Postgres is the sole source of truth.
        // The cache is only a latency signal; its "first seen" verdict can
        // be a false positive after an eviction or restart inside the 24h
        // window, so it never by itself concludes a command is new, only
        // the Postgres lookup does. The cache write still happens so a
        // concurrent in-flight dispatch of the same command is caught
        // immediately rather than racing past the lookup below.
        let _ = self.replay_cache.mark_first_seen(validated.command_id).await?;
        if let Some(prior) = result_repo
            .recent_within(validated.command_id, ChronoDuration::hours(REPLAY_WINDOW_HOURS))
            .await?
        {
            audit_repo
                .record(
                    &validated.operator_id.to_string(),
                    validated.tenant_id,
                    "command.dispatch",
                    "command",
                    &validated.command_id.to_string(),
                    AuditOutcome::Replay,
                    validated.correlation_id,
                    "replay suppressed: prior result re-emitted verbatim",
                )
                .await?;
            let status = CommandStatus::try_from_str(&prior.status).unwrap_or(CommandStatus::Failed);
            return Ok(DispatchOutcome {
                status,
                error_code: prior.error_code,
                error_message: prior.error_message,
                replayed: true,
            });
        }

        result_repo
            .create(
                validated.command_id,
                validated.node_id,
                &validated.command_type,
                &validated.payload,
                validated.correlation_id,
            )
            .await?;

        let handler = match self.registry.resolve(&validated.command_type) {
            Ok(h) => h,
            Err(err) => {
                let (code, message) = rejection_parts(&err);
                result_repo
                    .complete(validated.command_id, CommandStatus::Rejected, Some(&code), Some(&message))
                    .await?;
                audit_repo
                    .record(
                        &validated.operator_id.to_string(),
                        validated.tenant_id,
                        "command.dispatch",
                        "command",
                        &validated.command_id.to_string(),
                        AuditOutcome::Failure,
                        validated.correlation_id,
                        &message,
                    )
                    .await?;
                metrics::record_command_dispatch(&validated.command_type, false);
                return Ok(DispatchOutcome {
                    status: CommandStatus::Rejected,
                    error_code: Some(code),
                    error_message: Some(message),
                    replayed: false,
                });
            }
        };

        let ctx = HandlerContext {
            node_id: validated.node_id,
            tenant_id: validated.tenant_id,
            correlation_id: validated.correlation_id,
            cancellation: cancellation.clone(),
        };

        let outcome = if cancellation.is_cancelled() {
            DispatchOutcome {
                status: CommandStatus::Cancelled,
                error_code: None,
                error_message: None,
                replayed: false,
            }
        } else {
            match handler(ctx, validated.payload.clone()).await {
                Ok(()) if cancellation.is_cancelled() => DispatchOutcome {
                    status: CommandStatus::Cancelled,
                    error_code: None,
                    error_message: None,
                    replayed: false,
                },
                Ok(()) => DispatchOutcome {
                    status: CommandStatus::Succeeded,
                    error_code: None,
                    error_message: None,
                    replayed: false,
                },
                Err(_) => DispatchOutcome {
                    status: CommandStatus::Failed,
                    error_code: Some(ErrorCode::ExecutionException.as_str().to_string()),
                    error_message: Some("Internal execution error".to_string()),
                    replayed: false,
                },
            }
        };

        result_repo
            .complete(
                validated.command_id,
                outcome.status,
                outcome.error_code.as_deref(),
                outcome.error_message.as_deref(),
            )
            .await?;

        let audit_outcome = match outcome.status {
            CommandStatus::Succeeded => AuditOutcome::Success,
            _ => AuditOutcome::Failure,
        };
        audit_repo
            .record(
                &validated.operator_id.to_string(),
                validated.tenant_id,
                "command.dispatch",
                "command",
                &validated.command_id.to_string(),
                audit_outcome,
                validated.correlation_id,
                outcome.error_message.as_deref().unwrap_or("dispatched"),
            )
            .await?;

        metrics::record_command_dispatch(&validated.command_type, outcome.status == CommandStatus::Succeeded);

        if outcome.status == CommandStatus::Succeeded {
            if let Some(bus) = &self.bus {
                let _ = bus
                    .publish_json(
                        CommandCompleted::SUBJECT,
                        &CommandCompleted {
                            command_id: validated.command_id,
                            node_id: validated.node_id,
                            command_type: validated.command_type.clone(),
                            status: outcome.status,
                            correlation_id: validated.correlation_id,
                            at: chrono::Utc::now(),
                        },
                    )
                    .await;
            }
        }

        Ok(outcome)
    }
}

fn rejection_parts(err: &GridkeepError) -> (String, String) {
    let code = err.code().as_str().to_string();
    let message = match err {
        GridkeepError::Typed { detail, .. } => detail.clone(),
        other => other.to_string(),
    };
    (code, message)
}
