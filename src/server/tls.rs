//! TLS/mTLS listener configuration (§3, §6): the control-plane terminates
//! TLS itself, and optionally requests (but does not require) a client
//! certificate so operator and node connections can share one listener —
//! nodes present a leaf cert, operators authenticate via a bearer JWT
//! carried in the request instead.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};

use crate::types::{GridkeepError, Result};

fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| GridkeepError::Config(format!("cannot open cert {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GridkeepError::Config(format!("cannot parse cert {path}: {e}")))
}

fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| GridkeepError::Config(format!("cannot open key {path}: {e}")))?;
    let mut reader = BufReader::new(file);
    let mut keys = pkcs8_private_keys(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GridkeepError::Config(format!("cannot parse key {path}: {e}")))?;
    let key = keys
        .pop()
        .ok_or_else(|| GridkeepError::Config(format!("no private key found in {path}")))?;
    Ok(rustls::pki_types::PrivateKeyDer::Pkcs8(key))
}

/// Builds the server's rustls config: presents the control-plane's own
/// TLS cert, and trusts client certs chaining to the same root gridkeep
/// issues node leaves from, but doesn't require one (§6: operator calls
/// carry no client cert at all).
pub fn server_config(
    tls_cert_path: &str,
    tls_key_path: &str,
    ca_cert_path: &str,
) -> Result<Arc<ServerConfig>> {
    let cert_chain = load_certs(tls_cert_path)?;
    let key = load_key(tls_key_path)?;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_cert_path)? {
        roots
            .add(cert)
            .map_err(|e| GridkeepError::Config(format!("invalid CA root: {e}")))?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .map_err(|e| GridkeepError::Config(format!("client verifier build failed: {e}")))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)
        .map_err(|e| GridkeepError::Config(format!("invalid server cert/key: {e}")))?;

    Ok(Arc::new(config))
}
