//! gridkeep — control plane for multi-tenant game-server hosting.
//!
//! Wires up Postgres, Redis, NATS, the certificate authority, and every
//! domain service into a single `AppState`, then starts the mTLS listener.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use gridkeep::auth::OperatorJwtValidator;
use gridkeep::bus::events::CommandIssued;
use gridkeep::bus::BusClient;
use gridkeep::ca::{CertificateAuthority, CredentialStore, FileCredentialStore};
use gridkeep::cache::{ConsoleHistoryStore, RedisCache, ReplayCache, SessionRegistry};
use gridkeep::command::{CommandDispatcher, HandlerRegistry, RateLimiter};
use gridkeep::config::Args;
use gridkeep::console::{CommandSanitizer, ConsoleHub};
use gridkeep::context::InstanceId;
use gridkeep::db::Db;
use gridkeep::enrollment::EnrollmentCoordinator;
use gridkeep::heartbeat::HeartbeatProcessor;
use gridkeep::nodes::NodeService;
use gridkeep::server::{self, http::AppState};
use gridkeep::{logging, metrics};

/// Dangerous-pattern blocklist for operator-submitted console commands
/// (§4.H). Matched with a bounded timeout by `CommandSanitizer`; expand
/// this list as new destructive verbs surface in the game-server agents.
const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    r"(?i)rm\s+-rf\s+/",
    r"(?i):(){ *:\|:& *};:",
    r"(?i)mkfs\.",
    r"(?i)dd\s+if=.*of=/dev/",
    r"(?i)shutdown\b",
    r"(?i)format\s+[a-z]:",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    logging::init(&args.log_level, args.dev_mode);
    let instance_id = InstanceId::generate();
    info!(instance = %instance_id.0, "starting gridkeep");

    let db = Db::connect(&args.db).await?;
    db.migrate().await?;

    let cache = RedisCache::connect(&args.cache).await?;

    let bus = match BusClient::new(&args.nats, "gridkeep").await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "NATS bus unavailable at startup, continuing without it");
            None
        }
    };

    let ca_cert_pem = std::fs::read_to_string(&args.ca_cert_path).ok();
    let ca_key_pem = std::fs::read_to_string(&args.ca_key_path).ok();
    let ca = CertificateAuthority::new(ca_cert_pem, ca_key_pem, args.cert_validity_days)?;
    let ca_certificate_pem = ca.ca_certificate_pem().to_string();

    let credential_store: Box<dyn CredentialStore> =
        Box::new(FileCredentialStore::new("data/credentials", args.credential_store_master_secret().into_bytes()));

    let enrollment = EnrollmentCoordinator::new(
        db.pool().clone(),
        ca,
        credential_store,
        bus.clone(),
        args.cert_renewal_threshold_days,
    );

    let heartbeat = Arc::new(HeartbeatProcessor::new(
        db.pool().clone(),
        bus.clone(),
        args.health_score_window,
        args.health_trend_window,
        args.disk_degraded_pct,
        args.health_degraded_below,
        args.offline_after(),
    ));

    let nodes = NodeService::new(db.pool().clone(), bus.clone());

    let mut registry = HandlerRegistry::new();
    register_handlers(&mut registry, bus.clone());
    let replay_cache = ReplayCache::new(cache.clone(), args.command_replay_window_secs);
    let rate_limiter = RateLimiter::new(args.command_rate_limit_window_secs, args.command_rate_limit_max);
    let dispatcher = Arc::new(CommandDispatcher::new(db.pool().clone(), bus.clone(), registry, replay_cache, rate_limiter));

    let session_registry = SessionRegistry::new(cache.clone());
    let history = ConsoleHistoryStore::new(
        cache.clone(),
        args.console_hot_ttl_secs,
        args.console_hot_capacity,
        args.console_archive_batch,
        args.console_lock_ttl_secs,
    );
    let blocked_patterns: Vec<String> = DEFAULT_BLOCKED_PATTERNS.iter().map(|s| s.to_string()).collect();
    let sanitizer = CommandSanitizer::new(
        args.console_command_max_len,
        &blocked_patterns,
        Duration::from_millis(args.console_pattern_match_timeout_ms),
    )?;
    let console_hub = Arc::new(ConsoleHub::new(
        db.pool().clone(),
        session_registry,
        history,
        sanitizer,
        Arc::clone(&dispatcher),
        args.console_subscriber_queue_capacity,
        args.console_session_ttl_secs,
    ));

    let operator_jwt = OperatorJwtValidator::new(args.operator_jwt_secret())?;
    let metrics_handle = metrics::install();

    let tls_config = server::tls::server_config(&args.tls_cert_path, &args.tls_key_path, &args.ca_cert_path)?;

    let state = Arc::new(AppState {
        args,
        db,
        cache,
        bus,
        ca_certificate_pem,
        enrollment,
        heartbeat,
        nodes,
        dispatcher,
        console_hub,
        operator_jwt,
        metrics_handle,
        instance_id,
    });

    if let Err(e) = server::run(state, tls_config).await {
        error!(error = %e, "server terminated");
        std::process::exit(1);
    }

    Ok(())
}

/// Registers every known command-type handler (§4.E). Execution itself
/// always happens on the node agent, out-of-process; a handler's only job
/// is to hand the validated command off to the node over the bus. Dispatch
/// still succeeds with no bus configured — the command is recorded and
/// audited, just never delivered, matching the rest of the codebase's
/// degrade-without-bus behavior.
fn register_handlers(registry: &mut HandlerRegistry, bus: Option<BusClient>) {
    registry.register("console_command", move |ctx, payload| {
        let bus = bus.clone();
        async move {
            if let Some(bus) = bus {
                let event = CommandIssued {
                    node_id: ctx.node_id,
                    command_type: "console_command".to_string(),
                    payload: payload.to_string(),
                    correlation_id: ctx.correlation_id,
                    at: chrono::Utc::now(),
                };
                let _ = bus.publish_json(CommandIssued::SUBJECT, &event).await;
            }
            Ok(())
        }
    });
}
