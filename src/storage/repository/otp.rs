// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Six-digit one-time codes for login confirmation and password reset.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CloudResult;
use crate::state::AppState;
use crate::storage::Collection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRecord {
    pub otp: String,
    #[serde(with = "crate::clock::utc")]
    pub created_at: DateTime<Utc>,
}

/// The `otp` collection, keyed by email.
pub type OtpIndex = BTreeMap<String, OtpRecord>;

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

pub struct OtpRepository<'a> {
    state: &'a AppState,
}

impl<'a> OtpRepository<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn is_live(&self, record: &OtpRecord, now: DateTime<Utc>) -> bool {
        now - record.created_at < self.state.config.otp_expiry
    }

    /// Issue a fresh code for `email`, replacing any earlier one. Expired
    /// codes of all users are dropped on the way.
    pub async fn issue(&self, email: &str) -> CloudResult<String> {
        let now = self.state.clock.now();
        let code = generate_code();

        self.state
            .collections
            .update(Collection::Otp, |codes: &mut OtpIndex| {
                codes.retain(|_, record| self.is_live(record, now));
                codes.insert(
                    email.to_string(),
                    OtpRecord {
                        otp: code.clone(),
                        created_at: now,
                    },
                );
                Ok(())
            })
            .await?;
        Ok(code)
    }

    /// `true` if `code` is the live code for `email`.
    pub async fn verify(&self, email: &str, code: &str) -> bool {
        let now = self.state.clock.now();
        let codes: OtpIndex = self.state.collections.read(Collection::Otp).await;
        codes
            .get(email)
            .is_some_and(|record| record.otp == code.trim() && self.is_live(record, now))
    }

    /// Verify and remove in one step, so a code works only once.
    pub async fn consume(&self, email: &str, code: &str) -> CloudResult<bool> {
        let now = self.state.clock.now();
        self.state
            .collections
            .update(Collection::Otp, |codes: &mut OtpIndex| {
                let valid = codes
                    .get(email)
                    .is_some_and(|record| record.otp == code.trim() && self.is_live(record, now));
                if valid {
                    codes.remove(email);
                }
                Ok(valid)
            })
            .await
    }
}
