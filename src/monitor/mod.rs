// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity tracking, anomaly rules and security alerting.

pub mod activity;
pub mod alerts;
pub mod anomaly;

pub use activity::{bulk_detail, ActivityAction, ActivityEntry, ActivityLog};
pub use alerts::{AlertDispatcher, AlertKey, SentAlert, SentAlerts, ALERT_SUBJECT};
pub use anomaly::{
    analyze_recent, detect_dashboard_anomalies, ActionCounts, AnomalyAlert, RecentActivity,
    UserStats,
};
