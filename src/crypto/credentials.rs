// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing for account logins and share-link passwords.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;

use crate::error::{CloudError, CloudResult};

/// One-way credential hashing.
pub trait CredentialService: Send + Sync {
    /// Hash a secret into a self-describing string (algorithm, params, salt).
    fn hash(&self, secret: &str) -> CloudResult<String>;

    /// Check a secret against a stored hash. Malformed hashes never verify.
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Argon2id with the crate's default parameters, PHC string encoding.
#[derive(Default)]
pub struct Argon2Credentials {
    argon2: Argon2<'static>,
}

impl CredentialService for Argon2Credentials {
    fn hash(&self, secret: &str) -> CloudResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                tracing::error!(error = %e, "password hashing failed");
                CloudError::Encryption
            })
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored credential hash is malformed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let creds = Argon2Credentials::default();
        let hash = creds.hash("correct horse").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(creds.verify("correct horse", &hash));
        assert!(!creds.verify("wrong horse", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let creds = Argon2Credentials::default();
        assert_ne!(creds.hash("pw").unwrap(), creds.hash("pw").unwrap());
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let creds = Argon2Credentials::default();
        assert!(!creds.verify("pw", "plaintext-password"));
    }
}
