//! Enrollment token generation and verification (§4.C, §3).
//!
//! Tokens are presented once over a (required) TLS channel and consumed
//! atomically. The wire form is `{id}.{secret}` so the server can look the
//! row up directly instead of scanning every stored hash for a match; only
//! the secret half is hashed (reusing `auth::password`'s Argon2id verifier),
//! never the plaintext itself.

use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::types::Result;

const SECRET_BYTES: usize = 32;

/// A freshly generated token: the id (persisted in the clear, used for
/// lookup), the full wire-form plaintext shown to the operator exactly
/// once, and the secret's hash (the only thing persisted at rest).
pub struct GeneratedToken {
    pub id: Uuid,
    pub plaintext: String,
    pub hash: String,
}

pub fn generate() -> Result<GeneratedToken> {
    let id = Uuid::new_v4();
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let secret = hex::encode(bytes);
    let plaintext = format!("{id}.{secret}");
    let hash = hash_password(&secret)?;
    Ok(GeneratedToken { id, plaintext, hash })
}

/// Splits a presented `{id}.{secret}` token into its two halves.
pub fn split(plaintext: &str) -> Option<(Uuid, &str)> {
    let (id_str, secret) = plaintext.split_once('.')?;
    let id = Uuid::parse_str(id_str).ok()?;
    Some((id, secret))
}

pub fn verify(secret: &str, hash: &str) -> Result<bool> {
    verify_password(secret, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_verifies_against_its_own_hash() {
        let token = generate().unwrap();
        let (id, secret) = split(&token.plaintext).unwrap();
        assert_eq!(id, token.id);
        assert!(verify(secret, &token.hash).unwrap());
    }

    #[test]
    fn wrong_token_does_not_verify() {
        let token = generate().unwrap();
        assert!(!verify("wrong-secret", &token.hash).unwrap());
    }

    #[test]
    fn split_rejects_malformed_input() {
        assert!(split("no-dot-here").is_none());
        assert!(split("not-a-uuid.secret").is_none());
    }
}
