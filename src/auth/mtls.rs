//! Node identity extraction from a presented client certificate (§3, §4.D).
//!
//! The control-plane's TLS layer terminates mTLS and hands the verified
//! leaf certificate's DER bytes up to the application; this module pulls
//! the `node-{uuid}` common name back out and validates its shape.

use x509_parser::prelude::*;

use crate::types::{ErrorCode, GridkeepError, Result};
use uuid::Uuid;

/// Parses the presented certificate and extracts the node id encoded in
/// its CN (`node-{uuid}`). Rejects certs whose CN doesn't match that exact
/// format rather than attempting a lenient parse (§7: malformed identity
/// input fails closed).
pub fn node_id_from_certificate(der: &[u8]) -> Result<Uuid> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| GridkeepError::typed(ErrorCode::InvalidCertificate, format!("failed to parse certificate: {e}")))?;

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .ok_or_else(|| GridkeepError::typed(ErrorCode::MissingCN, "certificate has no CN".to_string()))?;

    let suffix = cn
        .strip_prefix("node-")
        .ok_or_else(|| GridkeepError::typed(ErrorCode::InvalidCNFormat, format!("CN '{cn}' is not of the form node-{{uuid}}")))?;

    Uuid::parse_str(suffix)
        .map_err(|_| GridkeepError::typed(ErrorCode::InvalidNodeId, format!("CN '{cn}' does not contain a valid uuid")))
}

pub fn thumbprint(der: &[u8]) -> String {
    crate::ca::authority::sha256_thumbprint(der)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_der() {
        let result = node_id_from_certificate(b"not a certificate");
        assert!(result.is_err());
    }
}
