//! Shared request/response plumbing for route handlers: JSON body
//! extraction, JSON responses, and RFC 7807 problem-document conversion.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{extract_token_from_header, OperatorClaims, OperatorJwtValidator};
use crate::types::GridkeepError;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn read_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, Response<Full<Bytes>>> {
    let body = req.into_body();
    let collected = body
        .collect()
        .await
        .map_err(|e| bad_request(&format!("failed to read request body: {e}")))?
        .to_bytes();

    if collected.len() > MAX_BODY_BYTES {
        return Err(bad_request("request body too large"));
    }

    serde_json::from_slice(&collected).map_err(|e| bad_request(&format!("invalid JSON body: {e}")))
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "title": "Bad Request", "detail": message }),
    )
}

/// Converts a core error into its RFC 7807 problem-document response
/// (§6 Error envelope, §7).
pub fn problem_response(err: GridkeepError, instance: &str) -> Response<Full<Bytes>> {
    let correlation_id = Uuid::new_v4();
    let status = err.status_code();
    let problem = err.into_problem_details(instance, correlation_id.to_string());
    json_response(status, &problem)
}

/// Extracts and verifies the operator bearer JWT from the `Authorization`
/// header (§6: operator identity comes only from a validated credential,
/// never client-supplied headers).
pub fn authenticate_operator(
    req: &Request<Incoming>,
    validator: &OperatorJwtValidator,
) -> Result<OperatorClaims, GridkeepError> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_token_from_header(header).ok_or_else(|| {
        GridkeepError::typed(crate::types::ErrorCode::Unauthorized, "missing bearer token".to_string())
    })?;
    validator.verify(token)
}

pub fn correlation_id_from(req: &Request<Incoming>) -> Uuid {
    req.headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}
