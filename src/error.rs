// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use chrono::{DateTime, Utc};

use crate::crypto::CryptoError;
use crate::storage::StorageError;

/// Error surfaced by every public operation of the core.
///
/// Messages are stable and safe to show to the requesting user. Internal
/// detail (paths, raw I/O errors) stays in the tracing output.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} has expired")]
    Expired(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("file could not be decrypted")]
    Decryption,

    #[error("file could not be encrypted")]
    Encryption,

    #[error("encryption key is unavailable or malformed")]
    KeyMaterial,

    #[error("account locked, try again in {minutes_left} minutes")]
    AccountLocked {
        until: DateTime<Utc>,
        minutes_left: i64,
    },

    #[error("too many requests, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("storage unavailable")]
    Storage(#[source] StorageError),
}

pub type CloudResult<T> = Result<T, CloudError>;

impl CloudError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Stable identifier for API clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Expired(_) => "expired",
            Self::Unauthorized(_) => "unauthorized",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Decryption => "decryption_failed",
            Self::Encryption => "encryption_failed",
            Self::KeyMaterial => "key_unavailable",
            Self::AccountLocked { .. } => "account_locked",
            Self::RateLimited { .. } => "rate_limited",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Conventional HTTP status for the routing layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Expired(_) | Self::AccountLocked { .. } => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited { .. } => 429,
            Self::Decryption | Self::Encryption | Self::KeyMaterial | Self::Storage(_) => 500,
        }
    }
}

impl From<StorageError> for CloudError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage operation failed");
        Self::Storage(err)
    }
}

impl From<CryptoError> for CloudError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption => Self::Decryption,
            CryptoError::Encryption => Self::Encryption,
            CryptoError::KeyMaterial(reason) => {
                tracing::error!(%reason, "encryption key rejected");
                Self::KeyMaterial
            }
            CryptoError::Io(e) => Self::Storage(StorageError::Io(e)),
        }
    }
}
