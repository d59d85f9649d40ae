//! Certificate authority and credential storage (§4.A, §4.B).

pub mod authority;
pub mod credential_store;

pub use authority::{CertificateAuthority, IssuedCertificate};
pub use credential_store::{seal_for_export, CredentialStore, EncryptedBundle, FileCredentialStore};

#[cfg(feature = "os-keystore")]
pub use credential_store::OsKeystoreCredentialStore;
