// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Service Data Models
//!
//! Request and response shapes of [`crate::service::CloudService`] that are
//! not storage records themselves. All response types derive `Serialize`
//! so the routing layer can return them as JSON unchanged.
//!
//! ## Model Categories
//!
//! - **Sessions**: login challenge and issued session
//! - **Bulk transfers**: multi-file upload input and reports
//! - **Monitoring**: per-user activity summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::repository::files::{DecryptedFile, StoredFile};

// =============================================================================
// Session Models
// =============================================================================

/// Returned by a successful password check. The login completes with the
/// one-time code delivered to `email`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginChallenge {
    pub email: String,
    /// Whether the code reached the notification sink.
    pub otp_sent: bool,
}

/// A signed session token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Session {
    pub email: String,
    pub token: String,
    #[serde(with = "crate::clock::utc")]
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Bulk Transfer Models
// =============================================================================

/// One file of a bulk upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadItem {
    pub name: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl UploadItem {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a bulk upload; files succeed or fail independently.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BulkUploadReport {
    pub uploaded: Vec<StoredFile>,
    pub failed: Vec<UploadFailure>,
}

/// Decrypted files of an all-or-nothing bulk download, in request order.
#[derive(Debug)]
pub struct BulkDownload {
    pub files: Vec<DecryptedFile>,
}

impl BulkDownload {
    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.content.len()).sum()
    }
}

// =============================================================================
// Monitoring Models
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnomalyNotice {
    pub message: String,
    pub severity: Severity,
}

/// Secondary counters of the monitor view.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MonitorStats {
    pub shares: u64,
    pub deletes: u64,
    pub failed_logins: u64,
    pub successful_logins: u64,
    pub shared_downloads: u64,
}

/// A user's activity over the anomaly window.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonitorReport {
    pub total_files: usize,
    pub total_uploads: u64,
    pub total_downloads: u64,
    pub anomalies: Vec<AnomalyNotice>,
    pub stats: MonitorStats,
    /// A new security alert went out with this report.
    pub alert_sent: bool,
}
