// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access log for file, sharing and session events.
//!
//! Entries are appended to the `access_log` collection and searched with
//! [`crate::search::query`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::repository::files::file_extension;
use super::Collection;
use crate::clock::{format_utc, parse_utc};
use crate::error::CloudResult;
use crate::state::AppState;

/// Extra attributes attached to an access entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccessMeta {
    /// Lowercased extension of `file`, or `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Recipients of a share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_emails: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One access log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessLogEntry {
    pub user: String,
    pub action: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file: String,
    #[serde(alias = "time", default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<AccessMeta>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl AccessLogEntry {
    pub fn new(user: impl Into<String>, action: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            action: action.into(),
            file: String::new(),
            timestamp: format_utc(&at),
            meta: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_receivers(mut self, receivers: Vec<String>) -> Self {
        self.meta.get_or_insert_with(AccessMeta::default).receiver_emails = Some(receivers);
        self
    }

    /// Attach an arbitrary meta attribute.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta
            .get_or_insert_with(AccessMeta::default)
            .extra
            .insert(key.into(), value);
        self
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.timestamp)
    }

    pub fn receiver_emails(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.receiver_emails.as_deref())
            .unwrap_or_default()
    }

    /// Fill in `meta.file_type` from the file name unless already set.
    fn derive_file_type(&mut self) {
        if self.file.is_empty() {
            return;
        }
        let meta = self.meta.get_or_insert_with(AccessMeta::default);
        if meta.file_type.is_none() {
            meta.file_type =
                Some(file_extension(&self.file).unwrap_or_else(|| "unknown".to_string()));
        }
    }
}

/// Repository for access log entries.
pub struct AccessLog<'a> {
    state: &'a AppState,
}

impl<'a> AccessLog<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Append an entry.
    pub async fn record(&self, mut entry: AccessLogEntry) -> CloudResult<()> {
        entry.derive_file_type();
        self.state
            .collections
            .append(Collection::AccessLog, &entry)
            .await
    }

    /// Append an entry stamped with the current time.
    pub async fn record_now(&self, user: &str, action: &str, file: &str) -> CloudResult<()> {
        self.record(AccessLogEntry::new(user, action, self.state.clock.now()).with_file(file))
            .await
    }

    pub async fn entries(&self) -> Vec<AccessLogEntry> {
        self.state.collections.read(Collection::AccessLog).await
    }

    pub async fn entries_for(&self, user: &str) -> Vec<AccessLogEntry> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.user == user)
            .collect()
    }
}
