//! Enrollment coordinator (§4.C): validates a presented token, creates the
//! node row, issues its first leaf certificate, and stores the private key.
//! Also handles certificate renewal ahead of expiry.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::password::verify_password;
use crate::bus::events::{AgentCertificateIssued, AgentCertificateRenewed};
use crate::bus::BusClient;
use crate::ca::{CertificateAuthority, CredentialStore};
use crate::db::schemas::{
    AuditOutcome, AuditRepository, EnrollmentTokenRepository, LeafCertificateRecord,
    LeafCertificateRepository, NodeRepository, NodeStatus, Platform,
};
use crate::types::{ErrorCode, GridkeepError, Result};

/// §4.C step 6: the exported certificate blob must fit in 8 KiB once
/// base64-encoded for wire transport.
const MAX_CERTIFICATE_BLOB_BASE64_BYTES: usize = 8 * 1024;

pub struct EnrollmentResult {
    pub node_id: Uuid,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub ca_certificate_pem: String,
}

pub struct EnrollmentCoordinator {
    pool: sqlx::PgPool,
    ca: CertificateAuthority,
    credential_store: Box<dyn CredentialStore>,
    bus: Option<BusClient>,
    renewal_threshold: Duration,
}

impl EnrollmentCoordinator {
    pub fn new(
        pool: sqlx::PgPool,
        ca: CertificateAuthority,
        credential_store: Box<dyn CredentialStore>,
        bus: Option<BusClient>,
        renewal_threshold_days: i64,
    ) -> Self {
        Self {
            pool,
            ca,
            credential_store,
            bus,
            renewal_threshold: Duration::days(renewal_threshold_days),
        }
    }

    /// Enroll a new node: redeem the token, create the node, issue its
    /// first certificate (§4.C). Requires a TLS transport (§3 invariant:
    /// plaintext enrollment is rejected by the caller before reaching here).
    pub async fn enroll(
        &self,
        token_plaintext: &str,
        name: &str,
        platform_str: &str,
    ) -> Result<EnrollmentResult> {
        let platform = Platform::from_str(platform_str)
            .ok_or_else(|| GridkeepError::typed(ErrorCode::InvalidPlatform, format!("unknown platform '{platform_str}'")))?;

        let (token_id, secret) = crate::enrollment::token::split(token_plaintext)
            .ok_or_else(|| GridkeepError::typed(ErrorCode::InvalidToken, "malformed token".to_string()))?;

        let token_repo = EnrollmentTokenRepository::new(&self.pool);
        let token = token_repo
            .get(token_id)
            .await?
            .ok_or_else(|| GridkeepError::typed(ErrorCode::InvalidToken, "token not found".to_string()))?;

        if token.is_expired() {
            return Err(GridkeepError::typed(ErrorCode::InvalidToken, "token has expired".to_string()));
        }
        if !verify_password(secret, &token.token_hash)? {
            return Err(GridkeepError::typed(ErrorCode::InvalidToken, "token does not match".to_string()));
        }

        let node_id = Uuid::new_v4();
        let node_repo = NodeRepository::new(&self.pool);
        let node = node_repo.create(node_id, token.tenant_id, name, platform).await?;

        if !token_repo.try_consume(token.id, node.id).await? {
            return Err(GridkeepError::typed(ErrorCode::InvalidToken, "token was already consumed".to_string()));
        }

        let issued = self.ca.issue(node.id)?;

        use base64::Engine;
        let encoded_len = base64::engine::general_purpose::STANDARD
            .encode(issued.certificate_pem.as_bytes())
            .len();
        if encoded_len > MAX_CERTIFICATE_BLOB_BASE64_BYTES {
            node_repo.delete(node.id).await?;
            token_repo.reset(token.id).await?;
            return Err(GridkeepError::typed(
                ErrorCode::CertificateTooLarge,
                format!(
                    "issued certificate is {encoded_len} bytes base64-encoded, exceeds the {MAX_CERTIFICATE_BLOB_BASE64_BYTES} byte limit"
                ),
            ));
        }

        LeafCertificateRepository::new(&self.pool)
            .insert(
                Uuid::new_v4(),
                node.id,
                &issued.thumbprint,
                &issued.serial,
                issued.not_before,
                issued.not_after,
            )
            .await?;
        self.credential_store.store(node.id, &issued.private_key_pem).await?;
        node_repo.set_status(node.id, NodeStatus::Offline).await?;

        AuditRepository::new(&self.pool)
            .record(
                "system",
                token.tenant_id,
                "node.enroll",
                "node",
                &node.id.to_string(),
                AuditOutcome::Success,
                Uuid::new_v4(),
                &format!("enrolled via token {}", token.id),
            )
            .await?;

        if let Some(bus) = &self.bus {
            let _ = bus
                .publish_json(
                    AgentCertificateIssued::SUBJECT,
                    &AgentCertificateIssued {
                        node_id: node.id,
                        thumbprint: issued.thumbprint.clone(),
                        not_after: issued.not_after,
                    },
                )
                .await;
        }

        Ok(EnrollmentResult {
            node_id: node.id,
            certificate_pem: issued.certificate_pem,
            private_key_pem: issued.private_key_pem,
            ca_certificate_pem: self.ca.ca_certificate_pem().to_string(),
        })
    }

    pub fn needs_renewal(&self, cert: &LeafCertificateRecord) -> bool {
        cert.not_after - Utc::now() <= self.renewal_threshold
    }

    /// Renew a node's certificate: revoke the active one, issue a fresh
    /// one. The node is unreachable for the brief window between the two
    /// operations; callers retry on `KeyMismatch` during that window.
    pub async fn renew(&self, node_id: Uuid) -> Result<EnrollmentResult> {
        let cert_repo = LeafCertificateRepository::new(&self.pool);
        let active = cert_repo
            .active_for_node(node_id)
            .await?
            .ok_or_else(|| GridkeepError::typed(ErrorCode::ChainMissing, "no active certificate for node".to_string()))?;

        let issued = self.ca.issue(node_id)?;
        cert_repo.revoke(active.id, "renewed").await?;
        cert_repo
            .insert(Uuid::new_v4(), node_id, &issued.thumbprint, &issued.serial, issued.not_before, issued.not_after)
            .await?;
        self.credential_store.store(node_id, &issued.private_key_pem).await?;

        if let Some(bus) = &self.bus {
            let _ = bus
                .publish_json(
                    AgentCertificateRenewed::SUBJECT,
                    &AgentCertificateRenewed {
                        node_id,
                        old_thumbprint: active.thumbprint.clone(),
                        new_thumbprint: issued.thumbprint.clone(),
                    },
                )
                .await;
        }

        Ok(EnrollmentResult {
            node_id,
            certificate_pem: issued.certificate_pem,
            private_key_pem: issued.private_key_pem,
            ca_certificate_pem: self.ca.ca_certificate_pem().to_string(),
        })
    }
}
