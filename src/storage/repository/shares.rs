// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password-protected, expiring share links.
//!
//! The link travels to recipients through the notification sink; the
//! password is handed back to the creator only, for delivery over a
//! separate channel.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use super::files::{DecryptedFile, FileIndex, FileRepository};
use crate::error::{CloudError, CloudResult};
use crate::state::AppState;
use crate::storage::{Collection, OwnedResource};

pub const DEFAULT_SHARE_TTL_SECS: i64 = 3600;
const TOKEN_BYTES: usize = 16;
const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareLink {
    pub token: String,
    pub owner: String,
    pub original_name: String,
    pub stored_name: String,
    #[serde(with = "crate::clock::utc")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::clock::utc")]
    pub expires_at: DateTime<Utc>,
    pub password_hash: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl ShareLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl OwnedResource for ShareLink {
    fn owner(&self) -> &str {
        &self.owner
    }
}

/// The `shares` collection, keyed by token.
pub type ShareIndex = BTreeMap<String, ShareLink>;

/// Returned once to the creator of a share.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedShare {
    pub token: String,
    pub link: String,
    /// Plaintext password. Never persisted and never sent to recipients.
    pub password: String,
    pub original_name: String,
    pub recipients: Vec<String>,
    #[serde(with = "crate::clock::utc")]
    pub expires_at: DateTime<Utc>,
}

/// Parameters of a new share.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub file_name: String,
    pub recipients: Vec<String>,
    pub ttl_seconds: i64,
    /// Generated when absent or blank.
    pub password: Option<String>,
}

impl ShareRequest {
    pub fn new(file_name: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            file_name: file_name.into(),
            recipients,
            ttl_seconds: DEFAULT_SHARE_TTL_SECS,
            password: None,
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Trimmed, lowercased, de-duplicated recipient addresses.
fn normalize_recipients(recipients: &[String]) -> CloudResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(recipients.len());
    for raw in recipients {
        let email = raw.trim().to_lowercase();
        if email.is_empty() {
            continue;
        }
        if !email.contains('@') {
            return Err(CloudError::validation(format!(
                "invalid recipient address: {email}"
            )));
        }
        if !normalized.contains(&email) {
            normalized.push(email);
        }
    }
    if normalized.is_empty() {
        return Err(CloudError::validation("at least one recipient is required"));
    }
    Ok(normalized)
}

pub struct ShareRepository<'a> {
    state: &'a AppState,
}

impl<'a> ShareRepository<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Create a share for one of the owner's active files and notify the
    /// recipients with the link.
    pub async fn create_share(&self, owner: &str, request: ShareRequest) -> CloudResult<CreatedShare> {
        if request.ttl_seconds <= 0 {
            return Err(CloudError::validation("share lifetime must be positive"));
        }
        let recipients = normalize_recipients(&request.recipients)?;
        let file = FileRepository::new(self.state)
            .find_active(owner, &request.file_name)
            .await?;

        let password = request
            .password
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(generate_password);
        let password_hash = self.state.credentials.hash(&password)?;

        let now = self.state.clock.now();
        let share = ShareLink {
            token: generate_token(),
            owner: owner.to_string(),
            original_name: file.record.original_name.clone(),
            stored_name: file.stored_name.clone(),
            created_at: now,
            expires_at: now + Duration::seconds(request.ttl_seconds),
            password_hash,
            recipients: recipients.clone(),
        };

        self.state
            .collections
            .update(Collection::Shares, |shares: &mut ShareIndex| {
                shares.insert(share.token.clone(), share.clone());
                Ok(())
            })
            .await?;

        let link = self.state.config.share_link(&share.token);
        self.notify_recipients(&share, &link);
        tracing::info!(
            token = %share.token,
            recipients = recipients.len(),
            expires_at = %share.expires_at,
            "share link created"
        );

        Ok(CreatedShare {
            token: share.token,
            link,
            password,
            original_name: share.original_name,
            recipients,
            expires_at: share.expires_at,
        })
    }

    /// Decrypt a shared file for anyone holding token and password.
    ///
    /// Expiry is checked before the password, so an expired link reports
    /// `Expired` even when the password is right.
    pub async fn redeem_share(&self, token: &str, password: &str) -> CloudResult<(ShareLink, DecryptedFile)> {
        let shares: ShareIndex = self.state.collections.read(Collection::Shares).await;
        let share = shares
            .get(token)
            .cloned()
            .ok_or_else(|| CloudError::not_found("share link"))?;

        if share.is_expired(self.state.clock.now()) {
            return Err(CloudError::Expired("share link".into()));
        }
        if !self.state.credentials.verify(password, &share.password_hash) {
            tracing::warn!(token = %share.token, "share password rejected");
            return Err(CloudError::unauthorized("incorrect share password"));
        }

        let files: FileIndex = self.state.collections.read(Collection::Files).await;
        let available = files
            .get(&share.stored_name)
            .is_some_and(|r| r.owner == share.owner && !r.is_trashed());
        if !available {
            return Err(CloudError::not_found("shared file"));
        }

        let file = FileRepository::new(self.state).open_blob(&share.stored_name, &share.original_name)?;
        Ok((share, file))
    }

    /// Shares created by `owner`, newest first.
    pub async fn list(&self, owner: &str) -> Vec<ShareLink> {
        let shares: ShareIndex = self.state.collections.read(Collection::Shares).await;
        let mut owned: Vec<ShareLink> = shares
            .into_values()
            .filter(|s| s.is_owned_by(owner))
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    fn notify_recipients(&self, share: &ShareLink, link: &str) {
        let subject = format!("{} shared a file with you", share.owner);
        let body = format!(
            "{owner} shared \"{name}\" with you.\n\n\
             Download link: {link}\n\
             The link expires at {expires}.\n\n\
             The password is sent to you separately by {owner}.",
            owner = share.owner,
            name = share.original_name,
            expires = crate::clock::format_utc(&share.expires_at),
        );
        for recipient in &share.recipients {
            if !self.state.notifier.send(recipient, &subject, &body) {
                tracing::warn!(token = %share.token, "share notification was not delivered");
            }
        }
    }
}
