// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptography
//!
//! - `cipher` - authenticated encryption of file content at rest
//! - `credentials` - password hashing for accounts and share links
//! - `tokens` - signed session tokens

pub mod cipher;
pub mod credentials;
pub mod tokens;

pub use cipher::FileCipher;
pub use credentials::{Argon2Credentials, CredentialService};
pub use tokens::{JwtTokenService, TokenService};

/// Errors raised by the cryptographic primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encryption,

    /// Tampered, truncated or foreign ciphertext.
    #[error("decryption failed")]
    Decryption,

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("key file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
