//! `POST /enroll` (§4.C, §6): the only route reachable without a client
//! certificate — a fresh node has nothing to present yet.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ca::seal_for_export;
use crate::routes::common::{json_response, problem_response, read_json_body};
use crate::server::http::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollRequest {
    token: String,
    platform: String,
    /// Self-declared node name, unique per tenant. Not named in the
    /// distilled wire surface but required to create a Node row; a
    /// natural supplement to {token, platform, hardwareInventory, publicKey}.
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    hardware_inventory: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    public_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrollResponse {
    node_id: uuid::Uuid,
    leaf_cert_pem: String,
    pkcs12: String,
    pkcs12_password: String,
    not_before: chrono::DateTime<chrono::Utc>,
    not_after: chrono::DateTime<chrono::Utc>,
}

pub async fn handle(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body: EnrollRequest = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let result = match state.enrollment.enroll(&body.token, &body.name, &body.platform).await {
        Ok(r) => r,
        Err(e) => return problem_response(e, "/enroll"),
    };

    let (bundle, password) = match seal_for_export(&result.private_key_pem) {
        Ok(b) => b,
        Err(e) => return problem_response(e, "/enroll"),
    };
    use base64::Engine;
    let pkcs12 = match serde_json::to_vec(&bundle) {
        Ok(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
        Err(e) => return problem_response(e.into(), "/enroll"),
    };

    let cert_repo = crate::db::schemas::LeafCertificateRepository::new(state.db.pool());
    let active = cert_repo.active_for_node(result.node_id).await;
    let (not_before, not_after) = match active {
        Ok(Some(cert)) => (cert.not_before, cert.not_after),
        _ => (chrono::Utc::now(), chrono::Utc::now()),
    };

    json_response(
        StatusCode::CREATED,
        &EnrollResponse {
            node_id: result.node_id,
            leaf_cert_pem: result.certificate_pem,
            pkcs12,
            pkcs12_password: password,
            not_before,
            not_after,
        },
    )
}
