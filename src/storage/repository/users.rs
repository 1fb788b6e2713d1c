// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User accounts and login lockout.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CloudError, CloudResult};
use crate::state::AppState;
use crate::storage::Collection;

/// Failed attempts that trigger a lockout.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;
pub const LOCKOUT_MINUTES: i64 = 15;

/// Optional profile details captured at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub dob: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password_hash: String,
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(default = "default_mfa")]
    pub mfa_enabled: bool,
    #[serde(with = "crate::clock::utc")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(
        default,
        with = "crate::clock::utc_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub locked_until: Option<DateTime<Utc>>,
}

fn default_mfa() -> bool {
    true
}

/// The `users` collection, keyed by lowercase email.
pub type UserIndex = BTreeMap<String, UserRecord>;

/// Outcome of a password check.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginCheck {
    Verified,
    /// Wrong password or unknown user; `attempts` counts consecutive
    /// failures for a known user.
    Rejected { attempts: u32 },
    LockedOut {
        until: DateTime<Utc>,
        /// This attempt triggered the lock.
        newly_locked: bool,
    },
}

/// Canonical form of a login email.
pub fn normalize_email(email: &str) -> CloudResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(CloudError::validation("a valid email address is required"));
    }
    Ok(email)
}

pub struct UserRepository<'a> {
    state: &'a AppState,
}

impl<'a> UserRepository<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn register(&self, email: &str, password: &str, profile: UserProfile) -> CloudResult<String> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(CloudError::validation("password is required"));
        }
        let password_hash = self.state.credentials.hash(password)?;
        let now = self.state.clock.now();

        self.state
            .collections
            .update(Collection::Users, |users: &mut UserIndex| {
                if users.contains_key(&email) {
                    return Err(CloudError::conflict("user already exists"));
                }
                users.insert(
                    email.clone(),
                    UserRecord {
                        password_hash,
                        profile,
                        mfa_enabled: true,
                        created_at: now,
                        failed_attempts: 0,
                        locked_until: None,
                    },
                );
                Ok(())
            })
            .await?;

        tracing::info!("user registered");
        Ok(email)
    }

    pub async fn get(&self, email: &str) -> Option<UserRecord> {
        let users: UserIndex = self.state.collections.read(Collection::Users).await;
        users.get(&email.trim().to_lowercase()).cloned()
    }

    pub async fn exists(&self, email: &str) -> bool {
        self.get(email).await.is_some()
    }

    /// Check a password and update the lockout counters.
    ///
    /// The hash is verified on the blocking pool without holding the users
    /// lock; only the counter update runs under it.
    pub async fn check_credentials(&self, email: &str, password: &str) -> CloudResult<LoginCheck> {
        let email = normalize_email(email)?;
        let now = self.state.clock.now();

        let Some(user) = self.get(&email).await else {
            return Ok(LoginCheck::Rejected { attempts: 0 });
        };
        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            return Ok(LoginCheck::LockedOut {
                until,
                newly_locked: false,
            });
        }

        let checked_hash = user.password_hash;
        let verified = self.verify_password(password, &checked_hash).await?;

        self.state
            .collections
            .update(Collection::Users, |users: &mut UserIndex| {
                let Some(user) = users.get_mut(&email) else {
                    return Ok(LoginCheck::Rejected { attempts: 0 });
                };

                match user.locked_until {
                    // Another attempt locked the account meanwhile.
                    Some(until) if until > now => {
                        return Ok(LoginCheck::LockedOut {
                            until,
                            newly_locked: false,
                        });
                    }
                    Some(_) => {
                        user.locked_until = None;
                        user.failed_attempts = 0;
                    }
                    None => {}
                }

                // The password changed while it was being checked.
                if user.password_hash != checked_hash {
                    return Ok(LoginCheck::Rejected {
                        attempts: user.failed_attempts,
                    });
                }

                if verified {
                    user.failed_attempts = 0;
                    return Ok(LoginCheck::Verified);
                }

                user.failed_attempts += 1;
                if user.failed_attempts >= MAX_FAILED_ATTEMPTS {
                    let until = now + Duration::minutes(LOCKOUT_MINUTES);
                    user.locked_until = Some(until);
                    return Ok(LoginCheck::LockedOut {
                        until,
                        newly_locked: true,
                    });
                }
                Ok(LoginCheck::Rejected {
                    attempts: user.failed_attempts,
                })
            })
            .await
    }

    async fn verify_password(&self, password: &str, hash: &str) -> CloudResult<bool> {
        let credentials = self.state.credentials.clone();
        let password = Zeroizing::new(password.to_string());
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || credentials.verify(&password, &hash))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "password verification task failed");
                CloudError::Encryption
            })
    }

    /// Replace the password and clear any lockout.
    pub async fn set_password(&self, email: &str, new_password: &str) -> CloudResult<()> {
        let email = normalize_email(email)?;
        if new_password.is_empty() {
            return Err(CloudError::validation("password is required"));
        }
        let password_hash = self.state.credentials.hash(new_password)?;

        self.state
            .collections
            .update(Collection::Users, |users: &mut UserIndex| {
                let user = users
                    .get_mut(&email)
                    .ok_or_else(|| CloudError::not_found("user"))?;
                user.password_hash = password_hash;
                user.failed_attempts = 0;
                user.locked_until = None;
                Ok(())
            })
            .await
    }
}
