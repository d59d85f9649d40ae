//! `/organizations/{tenantId}/nodes/*` routes (§6): operator-authenticated
//! via the validated JWT claims consumed in `common::authenticate_operator`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::schemas::{NodeRecord, NodeStatus, Platform};
use crate::routes::common::{authenticate_operator, json_response, problem_response};
use crate::server::http::AppState;
use crate::types::{ErrorCode, GridkeepError};

fn authorize_tenant(claimed_tenant: Uuid, path_tenant: Uuid) -> Result<(), GridkeepError> {
    if claimed_tenant == path_tenant {
        Ok(())
    } else {
        Err(GridkeepError::typed(ErrorCode::TenantMismatch, "operator does not belong to this tenant".to_string()))
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.to_string(), urlencoding_decode(v)))
        })
        .collect()
}

fn urlencoding_decode(s: &str) -> String {
    s.replace('+', " ")
}

#[derive(Serialize)]
struct NodeListResponse {
    nodes: Vec<NodeRecord>,
    limit: i64,
    offset: i64,
}

pub async fn handle_list(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate_operator(&req, &state.operator_jwt) {
        Ok(c) => c,
        Err(e) => return problem_response(e, "/organizations/nodes"),
    };
    if let Err(e) = authorize_tenant(claims.tenant, tenant_id) {
        return problem_response(e, "/organizations/nodes");
    }

    let query = parse_query(req.uri().query());
    let status = query.get("status").and_then(|s| NodeStatus::from_str(s));
    let platform = query.get("platform").and_then(|s| Platform::from_str(s));
    let limit: i64 = query.get("limit").and_then(|s| s.parse().ok()).unwrap_or(50);
    let offset: i64 = query.get("offset").and_then(|s| s.parse().ok()).unwrap_or(0);

    match state.nodes.list(tenant_id, status, platform, limit, offset).await {
        Ok(nodes) => json_response(StatusCode::OK, &NodeListResponse { nodes, limit, offset }),
        Err(e) => problem_response(e, "/organizations/nodes"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaintenanceRequest {
    action: String,
}

pub async fn handle_maintenance(
    state: Arc<AppState>,
    tenant_id: Uuid,
    node_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate_operator(&req, &state.operator_jwt) {
        Ok(c) => c,
        Err(e) => return problem_response(e, "/organizations/nodes/maintenance"),
    };
    if let Err(e) = authorize_tenant(claims.tenant, tenant_id) {
        return problem_response(e, "/organizations/nodes/maintenance");
    }

    let body: MaintenanceRequest = match crate::routes::common::read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let result = match body.action.as_str() {
        "enter" => state.nodes.enter_maintenance(tenant_id, node_id).await,
        "exit" => state.nodes.exit_maintenance(tenant_id, node_id).await,
        other => Err(GridkeepError::typed(ErrorCode::InvalidPayload, format!("unknown maintenance action '{other}'"))),
    };

    match result {
        Ok(node) => json_response(StatusCode::OK, &node),
        Err(e) => problem_response(e, "/organizations/nodes/maintenance"),
    }
}

pub async fn handle_decommission(
    state: Arc<AppState>,
    tenant_id: Uuid,
    node_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate_operator(&req, &state.operator_jwt) {
        Ok(c) => c,
        Err(e) => return problem_response(e, "/organizations/nodes"),
    };
    if let Err(e) = authorize_tenant(claims.tenant, tenant_id) {
        return problem_response(e, "/organizations/nodes");
    }

    // Idempotent (§6): a node already decommissioned is a success, not a
    // conflict — the caller's desired end state already holds.
    match state.nodes.decommission(tenant_id, node_id).await {
        Ok(node) => json_response(StatusCode::OK, &node),
        Err(GridkeepError::Typed { code: ErrorCode::NodeDecommissioned, .. }) => {
            match state.nodes.get(tenant_id, node_id).await {
                Ok(node) => json_response(StatusCode::OK, &node),
                Err(e) => problem_response(e, "/organizations/nodes"),
            }
        }
        Err(e) => problem_response(e, "/organizations/nodes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_tenant_rejects_mismatch() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(authorize_tenant(a, a).is_ok());
        assert!(authorize_tenant(a, b).is_err());
    }

    #[test]
    fn parse_query_decodes_plus_as_space() {
        let parsed = parse_query(Some("status=Degraded&platform=linux+server"));
        assert_eq!(parsed.get("status").map(String::as_str), Some("Degraded"));
        assert_eq!(parsed.get("platform").map(String::as_str), Some("linux server"));
    }

    #[test]
    fn parse_query_handles_missing_query() {
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn parse_query_skips_malformed_pairs() {
        let parsed = parse_query(Some("justakey&limit=10"));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("limit").map(String::as_str), Some("10"));
    }
}
