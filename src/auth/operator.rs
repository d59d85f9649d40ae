//! Operator identity assertions (§6): JWTs carrying `sub` (operator id) and
//! `tenant` (tenant id), signature-validated against the configured shared
//! secret. Adapted from the legacy `JwtValidator` in doorway's admin-proxy
//! port, generalized from Holochain agent claims to tenant/operator claims.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ErrorCode, GridkeepError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorClaims {
    pub sub: Uuid,
    pub tenant: Uuid,
    pub exp: u64,
    pub iat: u64,
}

#[derive(Clone)]
pub struct OperatorJwtValidator {
    secret: String,
}

impl OperatorJwtValidator {
    pub fn new(secret: String) -> Result<Self> {
        if secret.len() < 16 {
            return Err(GridkeepError::Config("operator JWT secret is too short".to_string()));
        }
        Ok(Self { secret })
    }

    pub fn verify(&self, token: &str) -> Result<OperatorClaims> {
        let data = decode::<OperatorClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| GridkeepError::typed(ErrorCode::Unauthorized, format!("invalid operator token: {e}")))?;
        Ok(data.claims)
    }
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    let token = header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_handles_bearer_prefix() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
    }

    #[test]
    fn validator_rejects_short_secret() {
        assert!(OperatorJwtValidator::new("short".to_string()).is_err());
    }
}
