//! # Credentials
//!
//! Argon2id password hashes plus random tokens for sessions and password
//! resets.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`),
//! so the parameters travel with the hash and can be raised later without
//! invalidating existing accounts.
use argon2::{
    Argon2,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Failed to hash password: {0}")]
pub struct HashError(password_hash::Error);

pub fn hash_password(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(HashError)
}

/// False for a wrong password and for anything that is not a PHC string.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(encoded) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// 40 hex characters, for password reset links.
pub fn reset_token() -> String {
    let bytes: [u8; 20] = rand::random();
    hex::encode(bytes)
}

/// 64 hex characters, for bearer sessions.
pub fn session_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let encoded = hash_password("correct horse").unwrap();

        assert!(encoded.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &encoded));
        assert!(!verify_password("wrong horse", &encoded));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(
            hash_password("same").unwrap(),
            hash_password("same").unwrap()
        );
    }

    #[test]
    fn test_malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "x"));
        assert!(!verify_password("x", "$argon2id$garbage"));
        assert!(!verify_password("x", "sha256$10000$00$00"));
    }

    #[test]
    fn test_tokens() {
        let reset = reset_token();
        let session = session_token();

        assert_eq!(reset.len(), 40);
        assert_eq!(session.len(), 64);
        assert!(reset.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(reset_token(), reset);
    }
}
