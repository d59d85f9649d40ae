//! Authentication for gridkeep: mTLS node identity, operator JWTs, and the
//! password/token hashing primitives both rely on.

pub mod mtls;
pub mod operator;
pub mod password;

pub use mtls::node_id_from_certificate;
pub use operator::{extract_token_from_header, OperatorClaims, OperatorJwtValidator};
pub use password::{hash_password, verify_password};
