// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed session tokens (HS256 JWT).

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{CloudError, CloudResult};

/// Issues and verifies bearer tokens identifying a user.
pub trait TokenService: Send + Sync {
    fn issue(&self, subject: &str, ttl: Duration) -> CloudResult<String>;

    /// Return the subject of a valid, unexpired token.
    fn verify(&self, token: &str) -> CloudResult<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl JwtTokenService {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            clock,
        }
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, subject: &str, ttl: Duration) -> CloudResult<String> {
        let now = self.clock.now();
        let claims = SessionClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign session token");
            CloudError::Encryption
        })
    }

    fn verify(&self, token: &str) -> CloudResult<String> {
        // Expiry is checked against the injected clock below.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "session token rejected");
                CloudError::unauthorized("invalid or expired session token")
            })?;
        if claims.exp <= self.clock.now().timestamp() {
            tracing::debug!("session token expired");
            return Err(CloudError::unauthorized("invalid or expired session token"));
        }
        Ok(claims.sub)
    }
}
