//! HTTP/mTLS server: shared application state, the TLS-accepting listener
//! loop, and the request router (§6 External Interfaces).
//!
//! Pattern adapted from holo-gateway's hyper http1 + `TokioIo` server loop,
//! generalized from a plaintext listener to one wrapped in a
//! `tokio_rustls::TlsAcceptor` so node (mTLS) and operator (bearer JWT)
//! traffic share a single port.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::mtls::node_id_from_certificate;
use crate::auth::OperatorJwtValidator;
use crate::bus::BusClient;
use crate::cache::RedisCache;
use crate::command::CommandDispatcher;
use crate::config::Args;
use crate::console::ConsoleHub;
use crate::context::InstanceId;
use crate::db::Db;
use crate::enrollment::EnrollmentCoordinator;
use crate::heartbeat::HeartbeatProcessor;
use crate::nodes::NodeService;
use crate::routes;
use crate::server::websocket;
use crate::types::{ErrorCode, GridkeepError};

/// Shared application state, constructed once in `main` and handed to every
/// connection task behind an `Arc`.
pub struct AppState {
    pub args: Args,
    pub db: Db,
    pub cache: RedisCache,
    pub bus: Option<BusClient>,
    pub ca_certificate_pem: String,
    pub enrollment: EnrollmentCoordinator,
    pub heartbeat: Arc<HeartbeatProcessor>,
    pub nodes: NodeService,
    pub dispatcher: Arc<CommandDispatcher>,
    pub console_hub: Arc<ConsoleHub>,
    pub operator_jwt: OperatorJwtValidator,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub instance_id: InstanceId,
}

/// Extracts the node id encoded in the CN of the client certificate
/// presented during the TLS handshake, if any (§6: mTLS is optional at the
/// transport layer so operator connections can share the port; it's
/// mandatory for every node-authenticated route, enforced per-route).
fn peer_node_id(tls_stream: &tokio_rustls::server::TlsStream<tokio::net::TcpStream>) -> Option<Uuid> {
    let certs = tls_stream.get_ref().1.peer_certificates()?;
    let leaf = certs.first()?;
    match node_id_from_certificate(leaf.as_ref()) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("presented client certificate did not yield a node id: {e}");
            None
        }
    }
}

/// Starts the mTLS-terminating listener and serves connections until the
/// process is killed.
pub async fn run(state: Arc<AppState>, tls_config: Arc<ServerConfig>) -> Result<(), GridkeepError> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| GridkeepError::Config(format!("failed to bind {}: {e}", state.args.listen)))?;
    let acceptor = TlsAcceptor::from(tls_config);

    info!("gridkeep listening on {} (instance {})", state.args.listen, state.instance_id.0);
    if state.args.dev_mode {
        warn!("dev mode enabled — relaxed TLS/secret enforcement, never use in production");
    }

    Arc::clone(&state.heartbeat).spawn_stale_sweep(state.args.offline_after());

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("error accepting TCP connection: {e}");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("TLS handshake with {addr} failed: {e}");
                    return;
                }
            };
            let cert_node_id = peer_node_id(&tls_stream);
            let io = TokioIo::new(tls_stream);

            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { handle_request(state, addr, cert_node_id, req).await }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                error!("error serving connection from {addr}: {e:?}");
            }
        });
    }
}

/// Splits a path of the form `/a/b/c` into its non-empty segments.
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_uuid(s: &str, instance: &str) -> Result<Uuid, Response<Full<Bytes>>> {
    Uuid::parse_str(s).map_err(|_| {
        routes::common::problem_response(
            GridkeepError::typed(ErrorCode::InvalidNodeId, format!("'{s}' is not a valid UUID")),
            instance,
        )
    })
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    cert_node_id: Option<Uuid>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let parts = segments(&path);

    info!("[{addr}] {method} {path}");

    let response = match (&method, parts.as_slice()) {
        (&Method::GET, ["health"]) => routes::health::health_check(),
        (&Method::GET, ["ready"]) => routes::health::readiness_check(state).await,
        (&Method::GET, ["version"]) => routes::health::version_info(),
        (&Method::GET, ["metrics"]) => routes::health::metrics_response(&state),

        (&Method::POST, ["enroll"]) => routes::enroll::handle(state, req).await,
        (&Method::GET, ["agents", "ca-certificate"]) => routes::agents::handle_ca_certificate(&state),

        (&Method::POST, ["agents", node_id, "heartbeat"]) => match parse_uuid(node_id, &path) {
            Ok(id) => routes::agents::handle_heartbeat(state, id, cert_node_id, req).await,
            Err(resp) => resp,
        },
        (&Method::POST, ["agents", node_id, "certificates", "renew"]) => match parse_uuid(node_id, &path) {
            Ok(id) => routes::agents::handle_renew(state, id, cert_node_id, req).await,
            Err(resp) => resp,
        },

        (&Method::GET, ["organizations", tenant_id, "nodes"]) => match parse_uuid(tenant_id, &path) {
            Ok(id) => routes::nodes::handle_list(state, id, req).await,
            Err(resp) => resp,
        },
        (&Method::POST, ["organizations", tenant_id, "nodes", node_id, "maintenance"]) => {
            match (parse_uuid(tenant_id, &path), parse_uuid(node_id, &path)) {
                (Ok(t), Ok(n)) => routes::nodes::handle_maintenance(state, t, n, req).await,
                (Err(resp), _) | (_, Err(resp)) => resp,
            }
        }
        (&Method::DELETE, ["organizations", tenant_id, "nodes", node_id]) => {
            match (parse_uuid(tenant_id, &path), parse_uuid(node_id, &path)) {
                (Ok(t), Ok(n)) => routes::nodes::handle_decommission(state, t, n, req).await,
                (Err(resp), _) | (_, Err(resp)) => resp,
            }
        }

        (&Method::POST, ["organizations", tenant_id, "enrollment-tokens"]) => match parse_uuid(tenant_id, &path) {
            Ok(id) => routes::tokens::handle_create(state, id, req).await,
            Err(resp) => resp,
        },
        (&Method::GET, ["organizations", tenant_id, "enrollment-tokens"]) => match parse_uuid(tenant_id, &path) {
            Ok(id) => routes::tokens::handle_list(state, id, req).await,
            Err(resp) => resp,
        },
        (&Method::DELETE, ["organizations", tenant_id, "enrollment-tokens", token_id]) => {
            match (parse_uuid(tenant_id, &path), parse_uuid(token_id, &path)) {
                (Ok(t), Ok(tok)) => routes::tokens::handle_revoke(state, t, tok, req).await,
                (Err(resp), _) | (_, Err(resp)) => resp,
            }
        }

        (&Method::GET, ["console"]) => {
            if hyper_tungstenite::is_upgrade_request(&req) {
                websocket::handle_console_upgrade(state, req).await
            } else {
                routes::common::problem_response(
                    GridkeepError::typed(ErrorCode::InvalidPayload, "console endpoint requires a WebSocket upgrade".to_string()),
                    &path,
                )
            }
        }

        _ => not_found(&path),
    };

    Ok(response)
}

fn not_found(path: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(format!(r#"{{"error":"not found","path":"{path}"}}"#))))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_splits_and_drops_empty_parts() {
        assert_eq!(segments("/organizations/abc/nodes/"), vec!["organizations", "abc", "nodes"]);
        assert_eq!(segments("/"), Vec::<&str>::new());
        assert_eq!(segments("health"), vec!["health"]);
    }

    #[test]
    fn parse_uuid_rejects_non_uuid_segments() {
        assert!(parse_uuid("not-a-uuid", "/path").is_err());
        assert!(parse_uuid(&Uuid::new_v4().to_string(), "/path").is_ok());
    }
}
