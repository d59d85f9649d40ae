//! `/organizations/{tenantId}/enrollment-tokens` (supplement): the spec's
//! wire surface (§6) never says how a tenant obtains the token `POST
//! /enroll` consumes — these routes are the operator-facing counterpart,
//! grounded in the already-built `enrollment::token`/`EnrollmentTokenRepository`.

use bytes::Bytes;
use chrono::{Duration, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::schemas::EnrollmentTokenRepository;
use crate::enrollment::token;
use crate::routes::common::{authenticate_operator, json_response, problem_response, read_json_body};
use crate::server::http::AppState;
use crate::types::{ErrorCode, GridkeepError};

fn authorize_tenant(claimed_tenant: Uuid, path_tenant: Uuid) -> Result<(), GridkeepError> {
    if claimed_tenant == path_tenant {
        Ok(())
    } else {
        Err(GridkeepError::typed(ErrorCode::TenantMismatch, "operator does not belong to this tenant".to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenRequest {
    #[serde(default)]
    label: Option<String>,
    #[serde(default = "default_ttl_hours")]
    ttl_hours: i64,
}

fn default_ttl_hours() -> i64 {
    24
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenResponse {
    id: Uuid,
    /// Shown once: the plaintext `{id}.{secret}` presented to `POST /enroll`.
    token: String,
    expires_at: chrono::DateTime<Utc>,
}

pub async fn handle_create(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate_operator(&req, &state.operator_jwt) {
        Ok(c) => c,
        Err(e) => return problem_response(e, "/organizations/enrollment-tokens"),
    };
    if let Err(e) = authorize_tenant(claims.tenant, tenant_id) {
        return problem_response(e, "/organizations/enrollment-tokens");
    }

    let body: CreateTokenRequest = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let generated = match token::generate() {
        Ok(t) => t,
        Err(e) => return problem_response(e, "/organizations/enrollment-tokens"),
    };
    let expires_at = Utc::now() + Duration::hours(body.ttl_hours);

    let repo = EnrollmentTokenRepository::new(state.db.pool());
    match repo
        .create(generated.id, tenant_id, body.label.as_deref(), &generated.hash, expires_at)
        .await
    {
        Ok(record) => json_response(
            StatusCode::CREATED,
            &CreateTokenResponse { id: record.id, token: generated.plaintext, expires_at: record.expires_at },
        ),
        Err(e) => problem_response(e, "/organizations/enrollment-tokens"),
    }
}

pub async fn handle_list(
    state: Arc<AppState>,
    tenant_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate_operator(&req, &state.operator_jwt) {
        Ok(c) => c,
        Err(e) => return problem_response(e, "/organizations/enrollment-tokens"),
    };
    if let Err(e) = authorize_tenant(claims.tenant, tenant_id) {
        return problem_response(e, "/organizations/enrollment-tokens");
    }

    let repo = EnrollmentTokenRepository::new(state.db.pool());
    match repo.list(tenant_id).await {
        Ok(tokens) => json_response(StatusCode::OK, &tokens),
        Err(e) => problem_response(e, "/organizations/enrollment-tokens"),
    }
}

pub async fn handle_revoke(
    state: Arc<AppState>,
    tenant_id: Uuid,
    token_id: Uuid,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let claims = match authenticate_operator(&req, &state.operator_jwt) {
        Ok(c) => c,
        Err(e) => return problem_response(e, "/organizations/enrollment-tokens"),
    };
    if let Err(e) = authorize_tenant(claims.tenant, tenant_id) {
        return problem_response(e, "/organizations/enrollment-tokens");
    }

    let repo = EnrollmentTokenRepository::new(state.db.pool());
    match repo.revoke(token_id, tenant_id).await {
        Ok(()) => json_response(StatusCode::NO_CONTENT, &serde_json::json!({})),
        Err(e) => problem_response(e, "/organizations/enrollment-tokens"),
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
    fn default_ttl_is_one_day() {
        assert_eq!(default_ttl_hours(), 24);
    }
}
