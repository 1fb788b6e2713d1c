// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity report, dashboard scan and access log search.

use super::CloudService;
use crate::error::CloudResult;
use crate::models::{AnomalyNotice, MonitorReport, MonitorStats, Severity};
use crate::monitor::{analyze_recent, ActivityAction, ActivityLog, AlertDispatcher};
use crate::search::{self, LogFilter, LogPage};
use crate::storage::repository::files::FileRepository;
use crate::storage::{AccessLog, AccessLogEntry};

impl CloudService {
    /// Summarize the user's activity over the anomaly window.
    ///
    /// A detected anomaly is mailed to the user unless the same message
    /// was the last one sent.
    pub async fn monitor_report(&self, user: &str) -> CloudResult<MonitorReport> {
        let entries = ActivityLog::new(&self.state).entries().await;
        let recent = analyze_recent(
            &entries,
            Some(user),
            self.state.config.anomaly_window,
            self.state.clock.now(),
        );
        let counts = recent.stats_for(user);
        let count = |action: ActivityAction| counts.get(action.as_str()).copied().unwrap_or(0);

        let message = recent.alert_message();
        let alert_sent = AlertDispatcher::new(&self.state)
            .dispatch_if_new(user, &message)
            .await?;

        let anomalies = recent
            .alert
            .map(|alert| AnomalyNotice {
                message: alert.message(),
                severity: Severity::High,
            })
            .into_iter()
            .collect();

        Ok(MonitorReport {
            total_files: FileRepository::new(&self.state).count_active(user).await,
            total_uploads: count(ActivityAction::Upload),
            total_downloads: count(ActivityAction::Download),
            anomalies,
            stats: MonitorStats {
                shares: count(ActivityAction::Share),
                deletes: count(ActivityAction::Delete),
                failed_logins: count(ActivityAction::FailedLogin),
                successful_logins: count(ActivityAction::LoginSuccess),
                shared_downloads: count(ActivityAction::SharedDownload),
            },
            alert_sent,
        })
    }

    /// Flag unusually active users across the whole activity log.
    pub async fn scan_dashboard(&self) -> CloudResult<Vec<String>> {
        AlertDispatcher::new(&self.state).scan_dashboard().await
    }

    /// Search the user's merged activity and access entries.
    pub async fn query_logs(&self, user: &str, filter: &LogFilter) -> CloudResult<LogPage> {
        self.state.search_limiter.check(user)?;

        let mut entries: Vec<AccessLogEntry> = ActivityLog::new(&self.state)
            .entries()
            .await
            .into_iter()
            .filter(|e| e.user == user)
            .map(AccessLogEntry::from)
            .collect();
        entries.extend(AccessLog::new(&self.state).entries_for(user).await);

        search::query(entries, filter)
    }
}
