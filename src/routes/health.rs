//! Liveness/readiness/version/metrics endpoints (§10.4, §10.5).
//!
//! Liveness returns 200 whenever the process is accepting connections.
//! Readiness additionally checks that Postgres, Redis, and NATS (when
//! configured) are reachable.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::server::http::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn health_check() -> Response<Full<Bytes>> {
    super::common::json_response(StatusCode::OK, &HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    database: bool,
    cache: bool,
    bus: bool,
}

pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let database = sqlx::query("SELECT 1").fetch_one(state.db.pool()).await.is_ok();

    let mut conn = state.cache.connection();
    let cache = redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok();

    let bus = match &state.bus {
        Some(client) => client.flush().await.is_ok(),
        None => true,
    };

    let ready = database && cache && bus;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    super::common::json_response(status, &ReadinessResponse { ready, database, cache, bus })
}

#[derive(Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
    git_commit_short: &'static str,
    git_commit_full: &'static str,
    build_timestamp: &'static str,
}

pub fn version_info() -> Response<Full<Bytes>> {
    super::common::json_response(
        StatusCode::OK,
        &VersionResponse {
            service: "gridkeep",
            version: env!("CARGO_PKG_VERSION"),
            git_commit_short: env!("GIT_COMMIT_SHORT"),
            git_commit_full: env!("GIT_COMMIT_FULL"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
        },
    )
}

pub fn metrics_response(state: &AppState) -> Response<Full<Bytes>> {
    let rendered = state.metrics_handle.render();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(Full::new(Bytes::from(rendered)))
        .unwrap()
}
