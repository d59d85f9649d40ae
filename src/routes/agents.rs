//! `/agents/*` routes (§4.D, §4.C RenewCertificate, §6): node-authenticated
//! via mTLS. The node UUID parsed from the presented leaf cert's CN is the
//! authoritative identity; the path segment is only used to route, and a
//! mismatch is rejected rather than silently trusted (§6: "Header-supplied
//! node IDs are never trusted" — the same applies to path-supplied ones).

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::schemas::{LeafCertificateRepository, NodeRepository};
use crate::heartbeat::{HeartbeatRequest, HeartbeatSample};
use crate::routes::common::{json_response, problem_response, read_json_body};
use crate::server::http::AppState;
use crate::types::{ErrorCode, GridkeepError};

fn authenticate_node(path_node_id: Uuid, cert_node_id: Option<Uuid>) -> Result<(), GridkeepError> {
    match cert_node_id {
        Some(id) if id == path_node_id => Ok(()),
        Some(_) => Err(GridkeepError::typed(ErrorCode::Forbidden, "client certificate does not match node path".to_string())),
        None => Err(GridkeepError::typed(ErrorCode::NotEnrolled, "no client certificate presented".to_string())),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatBody {
    metrics: HeartbeatMetrics,
    #[serde(default)]
    processes: ProcessCounts,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    declared_status: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    os_version: Option<String>,
    #[serde(default)]
    cpu_cores: Option<i32>,
    #[serde(default)]
    ram_bytes: Option<i64>,
    #[serde(default)]
    disk_bytes: Option<i64>,
    #[serde(default)]
    capacity_current_servers: Option<i32>,
    #[serde(default)]
    capacity_available_memory_bytes: Option<i64>,
    #[serde(default)]
    capacity_available_disk_bytes: Option<i64>,
}

#[derive(Deserialize)]
struct HeartbeatMetrics {
    cpu_pct: f64,
    mem_pct: f64,
    disk_pct: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ProcessCounts {
    #[serde(default)]
    failed: u32,
}

/// §8 boundary behavior: `100.0` is accepted, anything outside `0.0..=100.0`
/// is a validation error rather than being silently clamped downstream.
fn validate_metrics(metrics: &HeartbeatMetrics) -> Result<(), GridkeepError> {
    for (name, value) in [
        ("cpuUsagePercent", metrics.cpu_pct),
        ("memUsagePercent", metrics.mem_pct),
        ("diskUsagePercent", metrics.disk_pct),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(GridkeepError::typed(
                ErrorCode::InvalidMetric,
                format!("{name} must be within 0.0..=100.0, got {value}"),
            ));
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatResponse {
    acknowledged: bool,
    server_time: chrono::DateTime<chrono::Utc>,
}

pub async fn handle_heartbeat(
    state: Arc<AppState>,
    node_id: Uuid,
    cert_node_id: Option<Uuid>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if let Err(e) = authenticate_node(node_id, cert_node_id) {
        return problem_response(e, "/agents/heartbeat");
    }

    let body: HeartbeatBody = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    if let Err(e) = validate_metrics(&body.metrics) {
        return problem_response(e, "/agents/heartbeat");
    }

    let node = match NodeRepository::new(state.db.pool()).get(node_id).await {
        Ok(Some(n)) => n,
        Ok(None) => return problem_response(GridkeepError::typed(ErrorCode::NodeNotFound, "node not found".to_string()), "/agents/heartbeat"),
        Err(e) => return problem_response(e, "/agents/heartbeat"),
    };

    let sample = HeartbeatSample {
        cpu_pct: body.metrics.cpu_pct,
        mem_pct: body.metrics.mem_pct,
        disk_pct: body.metrics.disk_pct,
        failed_processes: body.processes.failed,
    };

    let hb_req = HeartbeatRequest {
        node_id,
        sample,
        hostname: body.hostname,
        os_version: body.os_version,
        cpu_cores: body.cpu_cores,
        ram_bytes: body.ram_bytes,
        disk_bytes: body.disk_bytes,
        capacity_current_servers: body.capacity_current_servers,
        capacity_available_memory_bytes: body.capacity_available_memory_bytes,
        capacity_available_disk_bytes: body.capacity_available_disk_bytes,
        warnings: body.warnings,
    };

    match state.heartbeat.process(node.tenant_id, hb_req).await {
        Ok(_) => json_response(
            StatusCode::OK,
            &HeartbeatResponse { acknowledged: true, server_time: chrono::Utc::now() },
        ),
        Err(e) => problem_response(e, "/agents/heartbeat"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewRequest {
    current_thumbprint: String,
    #[serde(default)]
    #[allow(dead_code)]
    new_public_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewResponse {
    leaf_cert_pem: String,
    pkcs12: String,
    pkcs12_password: String,
    not_before: chrono::DateTime<chrono::Utc>,
    not_after: chrono::DateTime<chrono::Utc>,
}

pub async fn handle_renew(
    state: Arc<AppState>,
    node_id: Uuid,
    cert_node_id: Option<Uuid>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if let Err(e) = authenticate_node(node_id, cert_node_id) {
        return problem_response(e, "/agents/certificates/renew");
    }

    let body: RenewRequest = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let cert_repo = LeafCertificateRepository::new(state.db.pool());
    let active = match cert_repo.active_for_node(node_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return problem_response(GridkeepError::typed(ErrorCode::ChainMissing, "no active certificate for node".to_string()), "/agents/certificates/renew"),
        Err(e) => return problem_response(e, "/agents/certificates/renew"),
    };

    if active.thumbprint != body.current_thumbprint {
        return problem_response(
            GridkeepError::typed(ErrorCode::KeyMismatch, "presented thumbprint does not match the active certificate".to_string()),
            "/agents/certificates/renew",
        );
    }

    let result = match state.enrollment.renew(node_id).await {
        Ok(r) => r,
        Err(e) => return problem_response(e, "/agents/certificates/renew"),
    };

    let (bundle, password) = match crate::ca::seal_for_export(&result.private_key_pem) {
        Ok(b) => b,
        Err(e) => return problem_response(e, "/agents/certificates/renew"),
    };
    use base64::Engine;
    let pkcs12 = match serde_json::to_vec(&bundle) {
        Ok(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
        Err(e) => return problem_response(e.into(), "/agents/certificates/renew"),
    };

    let new_active = cert_repo.active_for_node(node_id).await.ok().flatten();
    let (not_before, not_after) = new_active
        .map(|c| (c.not_before, c.not_after))
        .unwrap_or_else(|| (chrono::Utc::now(), chrono::Utc::now()));

    json_response(
        StatusCode::OK,
        &RenewResponse {
            leaf_cert_pem: result.certificate_pem,
            pkcs12,
            pkcs12_password: password,
            not_before,
            not_after,
        },
    )
}

pub fn handle_ca_certificate(state: &AppState) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/x-pem-file")
        .body(Full::new(Bytes::from(state.ca_certificate_pem.clone())))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_node_accepts_matching_cert() {
        let node_id = Uuid::new_v4();
        assert!(authenticate_node(node_id, Some(node_id)).is_ok());
    }

    #[test]
    fn authenticate_node_rejects_mismatched_cert() {
        let node_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let err = authenticate_node(node_id, Some(other)).unwrap_err();
        assert!(matches!(err, GridkeepError::Typed { code: ErrorCode::Forbidden, .. }));
    }

    #[test]
    fn validate_metrics_accepts_exactly_100() {
        let metrics = HeartbeatMetrics { cpu_pct: 100.0, mem_pct: 0.0, disk_pct: 0.0 };
        assert!(validate_metrics(&metrics).is_ok());
    }

    #[test]
    fn validate_metrics_rejects_above_100() {
        let metrics = HeartbeatMetrics { cpu_pct: 100.01, mem_pct: 0.0, disk_pct: 0.0 };
        let err = validate_metrics(&metrics).unwrap_err();
        assert!(matches!(err, GridkeepError::Typed { code: ErrorCode::InvalidMetric, .. }));
    }

    #[test]
    fn validate_metrics_rejects_negative() {
        let metrics = HeartbeatMetrics { cpu_pct: 0.0, mem_pct: -0.01, disk_pct: 0.0 };
        assert!(validate_metrics(&metrics).is_err());
    }

    #[test]
    fn authenticate_node_rejects_missing_cert() {
        let node_id = Uuid::new_v4();
        let err = authenticate_node(node_id, None).unwrap_err();
        assert!(matches!(err, GridkeepError::Typed { code: ErrorCode::NotEnrolled, .. }));
    }
}
