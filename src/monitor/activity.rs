// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-user activity entries feeding the anomaly detector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{format_utc, parse_utc};
use crate::state::AppState;
use crate::storage::Collection;

/// Kind of user activity. Unknown kinds round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityAction {
    Upload,
    Download,
    Delete,
    Share,
    LoginSuccess,
    FailedLogin,
    BulkUpload,
    BulkDownload,
    SharedDownload,
    Other(String),
}

impl ActivityAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::Share => "share",
            Self::LoginSuccess => "login_success",
            Self::FailedLogin => "failed_login",
            Self::BulkUpload => "bulk_upload",
            Self::BulkDownload => "bulk_download",
            Self::SharedDownload => "shared_download",
            Self::Other(other) => other,
        }
    }

    /// Single-file action a bulk action expands to.
    pub fn unbulked(&self) -> Option<ActivityAction> {
        match self {
            Self::BulkUpload => Some(Self::Upload),
            Self::BulkDownload => Some(Self::Download),
            _ => None,
        }
    }
}

impl From<String> for ActivityAction {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "upload" => Self::Upload,
            "download" => Self::Download,
            "delete" => Self::Delete,
            "share" => Self::Share,
            "login_success" => Self::LoginSuccess,
            "failed_login" => Self::FailedLogin,
            "bulk_upload" => Self::BulkUpload,
            "bulk_download" => Self::BulkDownload,
            "shared_download" => Self::SharedDownload,
            _ => Self::Other(raw),
        }
    }
}

impl From<ActivityAction> for String {
    fn from(action: ActivityAction) -> Self {
        match action {
            ActivityAction::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub user: String,
    pub action: ActivityAction,
    /// File name, or a count such as `"5 files"` for bulk actions.
    #[serde(default)]
    pub file: Option<String>,
    pub timestamp: String,
}

impl ActivityEntry {
    pub fn new(
        user: impl Into<String>,
        action: ActivityAction,
        file: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user: user.into(),
            action,
            file,
            timestamp: format_utc(&at),
        }
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.timestamp)
    }

    /// Item count carried by a bulk entry: the leading integer of `file`,
    /// defaulting to 1.
    pub fn bulk_count(&self) -> u64 {
        self.file
            .as_deref()
            .and_then(|detail| detail.split_whitespace().next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(1)
    }
}

/// Detail string recorded for a bulk action.
pub fn bulk_detail(count: usize) -> String {
    format!("{count} files")
}

/// Append-only activity log.
pub struct ActivityLog<'a> {
    state: &'a AppState,
}

impl<'a> ActivityLog<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Record an action. Failures are logged and swallowed: activity
    /// tracking never fails the operation being tracked.
    pub async fn record(&self, user: &str, action: ActivityAction, file: Option<&str>) {
        if user.trim().is_empty() {
            tracing::debug!(%action, "activity without user ignored");
            return;
        }
        let entry = ActivityEntry::new(user, action, file.map(str::to_string), self.state.clock.now());
        if let Err(e) = self
            .state
            .collections
            .append(Collection::ActivityLog, &entry)
            .await
        {
            tracing::warn!(action = %entry.action, error = %e, "failed to record activity");
        }
    }

    pub async fn entries(&self) -> Vec<ActivityEntry> {
        self.state.collections.read(Collection::ActivityLog).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::context;
    use serde_json::json;

    #[test]
    fn actions_roundtrip_including_unknown() {
        let entries: Vec<ActivityEntry> = serde_json::from_value(json!([
            {"user": "a", "action": "failed_login", "file": null, "timestamp": "2024-01-01T00:00:00"},
            {"user": "a", "action": "rename_folder", "file": "x", "timestamp": "2024-01-01T00:00:00"}
        ]))
        .unwrap();

        assert_eq!(entries[0].action, ActivityAction::FailedLogin);
        assert_eq!(
            entries[1].action,
            ActivityAction::Other("rename_folder".into())
        );

        let back = serde_json::to_value(&entries).unwrap();
        assert_eq!(back[1]["action"], "rename_folder");
        assert_eq!(back[0]["action"], "failed_login");
    }

    #[test]
    fn bulk_counts_parse_leading_integer() {
        let at = Utc::now();
        let entry = |detail: Option<&str>| {
            ActivityEntry::new("a", ActivityAction::BulkUpload, detail.map(str::to_string), at)
        };

        assert_eq!(entry(Some("5 files")).bulk_count(), 5);
        assert_eq!(entry(Some("12")).bulk_count(), 12);
        assert_eq!(entry(Some("several files")).bulk_count(), 1);
        assert_eq!(entry(None).bulk_count(), 1);
        assert_eq!(bulk_detail(3), "3 files");
    }

    #[tokio::test]
    async fn record_appends_and_skips_anonymous() {
        let ctx = context();
        let log = ActivityLog::new(&ctx.state);

        log.record("alice@x.com", ActivityAction::Upload, Some("a.txt"))
            .await;
        log.record("", ActivityAction::Upload, Some("b.txt")).await;

        let entries = log.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file.as_deref(), Some("a.txt"));
        assert!(entries[0].timestamp_utc().is_some());
    }
}
