//! Certificate authority: CSR-less leaf issuance, renewal, and revocation
//! (§4.B). Node keypairs are generated here, server-side, rather than from a
//! client-submitted CSR — the spec's enrollment flow trusts the control
//! plane, not the node, to produce the keypair.

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, IsCa, Ia5String, KeyPair, KeyUsagePurpose,
    SanType,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{ErrorCode, GridkeepError, Result};

/// A freshly issued leaf certificate plus its private key, both PEM-encoded.
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub thumbprint: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Wraps the CA's own keypair and issues/renews/revokes node leaf certs.
///
/// Revocation itself has no cryptographic artifact here — §4.B treats it as
/// a database state change (`leaf_certificates.revoked`); there is no CRL or
/// OCSP responder, mTLS handshakes that present a revoked cert are rejected
/// at the application layer by checking the thumbprint against the store.
pub struct CertificateAuthority {
    ca_cert_pem: String,
    ca_key_pair: KeyPair,
    ca_params: CertificateParams,
    leaf_validity_days: i64,
}

impl CertificateAuthority {
    /// Load (or, if absent, self-generate) the root CA keypair.
    ///
    /// A self-signed root generated at first boot is appropriate for a
    /// single control-plane deployment; operators who need an externally
    /// rooted chain supply `ca_cert_pem`/`ca_key_pem` instead (§4.B Non-goals:
    /// cross-signing with an external root is out of scope).
    pub fn new(ca_cert_pem: Option<String>, ca_key_pem: Option<String>, leaf_validity_days: i64) -> Result<Self> {
        match (ca_cert_pem, ca_key_pem) {
            (Some(cert_pem), Some(key_pem)) => {
                let key_pair = KeyPair::from_pem(&key_pem)
                    .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("invalid CA key: {e}")))?;
                let params = Self::root_params()?;
                Ok(Self {
                    ca_cert_pem: cert_pem,
                    ca_key_pair: key_pair,
                    ca_params: params,
                    leaf_validity_days,
                })
            }
            _ => {
                let key_pair = KeyPair::generate()
                    .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("CA keygen failed: {e}")))?;
                let params = Self::root_params()?;
                let cert = params
                    .self_signed(&key_pair)
                    .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("CA self-sign failed: {e}")))?;
                Ok(Self {
                    ca_cert_pem: cert.pem(),
                    ca_key_pair: key_pair,
                    ca_params: params,
                    leaf_validity_days,
                })
            }
        }
    }

    fn root_params() -> Result<CertificateParams> {
        let mut params = CertificateParams::new(Vec::new())
            .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("CA params failed: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "gridkeep-root-ca");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        Ok(params)
    }

    pub fn ca_certificate_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Issue a fresh leaf certificate for `node_id` with CN=`node-{uuid}`
    /// (§3 Leaf Certificate, §4.B).
    pub fn issue(&self, node_id: Uuid) -> Result<IssuedCertificate> {
        let cn = format!("node-{node_id}");
        let leaf_key = KeyPair::generate()
            .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("leaf keygen failed: {e}")))?;

        let mut params = CertificateParams::new(Vec::new())
            .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("leaf params failed: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn.as_str());
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        let not_before = Utc::now();
        let not_after = not_before + Duration::days(self.leaf_validity_days);
        params.not_before = not_before.into();
        params.not_after = not_after.into();
        if let Ok(san) = Ia5String::try_from(cn.clone()) {
            params.subject_alt_names = vec![SanType::DnsName(san)];
        }

        let issuer = rcgen::Issuer::from_params(&self.ca_params, &self.ca_key_pair);
        let cert = params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| GridkeepError::typed(ErrorCode::CryptoError, format!("leaf signing failed: {e}")))?;

        let certificate_pem = cert.pem();
        let thumbprint = sha256_thumbprint(cert.der());
        let serial = hex::encode(cert.params().serial_number.clone().unwrap_or_default().to_bytes());

        Ok(IssuedCertificate {
            certificate_pem,
            private_key_pem: leaf_key.serialize_pem(),
            thumbprint,
            serial,
            not_before,
            not_after,
        })
    }
}

pub fn sha256_thumbprint(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_embeds_node_cn() {
        let ca = CertificateAuthority::new(None, None, 90).unwrap();
        let node_id = Uuid::new_v4();
        let issued = ca.issue(node_id).unwrap();
        assert!(issued.certificate_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(issued.thumbprint.len(), 64);
        assert!(issued.not_after > issued.not_before);
    }

    #[test]
    fn two_issuances_have_distinct_thumbprints() {
        let ca = CertificateAuthority::new(None, None, 90).unwrap();
        let a = ca.issue(Uuid::new_v4()).unwrap();
        let b = ca.issue(Uuid::new_v4()).unwrap();
        assert_ne!(a.thumbprint, b.thumbprint);
    }
}
