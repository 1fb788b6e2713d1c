// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Service Facade
//!
//! [`CloudService`] is the single entry point for callers such as an HTTP
//! router. Each operation authorizes against the calling user, runs the
//! repository work and then records activity and access entries.
//!
//! ## Modules
//!
//! - `accounts` - Registration, login with lockout, OTP, sessions
//! - `files` - Upload, download, trash and folders
//! - `sharing` - Share links
//! - `monitoring` - Activity report, dashboard scan, log search

mod accounts;
mod files;
mod monitoring;
mod sharing;

pub use accounts::SESSION_TTL_HOURS;
pub use files::{MAX_BULK_DOWNLOAD_FILES, MAX_BULK_UPLOAD_BYTES, MAX_BULK_UPLOAD_FILES};

use crate::monitor::{ActivityAction, ActivityLog};
use crate::state::AppState;
use crate::storage::{AccessLog, AccessLogEntry};

#[derive(Clone)]
pub struct CloudService {
    state: AppState,
}

impl CloudService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    async fn track(&self, user: &str, action: ActivityAction, file: Option<&str>) {
        ActivityLog::new(&self.state).record(user, action, file).await;
    }

    /// Append to the access log. Failures are logged, never returned.
    async fn audit(&self, entry: AccessLogEntry) {
        let action = entry.action.clone();
        if let Err(e) = AccessLog::new(&self.state).record(entry).await {
            tracing::warn!(%action, error = %e, "failed to write access log");
        }
    }

    async fn audit_now(&self, user: &str, action: &str, file: &str) {
        let entry = AccessLogEntry::new(user, action, self.state.clock.now()).with_file(file);
        self.audit(entry).await;
    }
}
