// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! At-most-once delivery of security alerts.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::activity::ActivityLog;
use super::anomaly::{detect_dashboard_anomalies, AnomalyAlert};
use crate::clock::format_utc;
use crate::error::CloudResult;
use crate::state::AppState;
use crate::storage::Collection;

pub const ALERT_SUBJECT: &str = "Security Alert: Suspicious Activity Detected";

/// Value stored per alert key: a marker, or the last message / send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SentAlert {
    Flag(bool),
    Note(String),
}

impl SentAlert {
    pub fn is_set(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Note(note) => !note.is_empty(),
        }
    }
}

/// Contents of the `sent_alerts` collection.
pub type SentAlerts = BTreeMap<String, SentAlert>;

/// Key shapes of the `sent_alerts` collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKey<'a> {
    /// Last message dispatched to the user.
    LastMessage(&'a str),
    /// One alert of a kind per user per UTC day.
    Daily {
        user: &'a str,
        kind: &'a str,
        day: NaiveDate,
    },
    Dashboard(&'a str),
}

impl fmt::Display for AlertKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastMessage(user) => f.write_str(user),
            Self::Daily { user, kind, day } => {
                write!(f, "{user}_{kind}_{}", day.format("%Y%m%d"))
            }
            Self::Dashboard(user) => write!(f, "{user}_high_activity_dashboard"),
        }
    }
}

fn alert_body(message: &str) -> String {
    format!(
        "Hello,\n\nOur monitoring system detected suspicious activity on your account:\n\n\
         {message}\n\nIf this wasn't you, please change your password and contact support.\n"
    )
}

/// Sends security alerts through the notification sink, recording what
/// was sent so repeats are suppressed.
pub struct AlertDispatcher<'a> {
    state: &'a AppState,
}

impl<'a> AlertDispatcher<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Send a security alert right away, without dedup.
    pub fn notify_security(&self, user: &str, message: &str) -> bool {
        if user.is_empty() || message.is_empty() {
            return false;
        }
        let delivered = self
            .state
            .notifier
            .send(user, ALERT_SUBJECT, &alert_body(message));
        if delivered {
            tracing::info!(user, "security alert sent");
        } else {
            tracing::warn!(user, "security alert delivery failed");
        }
        delivered
    }

    /// Send `message` unless it equals the last message sent to `user`.
    ///
    /// The last-sent record only moves when the sink accepts the alert, so
    /// a failed delivery is retried on the next call.
    pub async fn dispatch_if_new(&self, user: &str, message: &str) -> CloudResult<bool> {
        if message.is_empty() {
            return Ok(false);
        }
        self.state
            .collections
            .update(Collection::SentAlerts, |sent: &mut SentAlerts| {
                let key = AlertKey::LastMessage(user).to_string();
                if matches!(sent.get(&key), Some(SentAlert::Note(last)) if last == message) {
                    tracing::debug!(user, "alert already sent, skipping");
                    return Ok(false);
                }
                if !self.notify_security(user, message) {
                    return Ok(false);
                }
                sent.insert(key, SentAlert::Note(message.to_string()));
                Ok(true)
            })
            .await
    }

    /// Send `alert` at most once per UTC day.
    ///
    /// Also records the message as the last one sent, so the monitor flow
    /// does not repeat it.
    pub async fn dispatch_daily(&self, user: &str, alert: AnomalyAlert) -> CloudResult<bool> {
        let now = self.state.clock.now();
        let message = alert.message();
        self.state
            .collections
            .update(Collection::SentAlerts, |sent: &mut SentAlerts| {
                let daily = AlertKey::Daily {
                    user,
                    kind: alert.kind(),
                    day: now.date_naive(),
                }
                .to_string();
                if sent.get(&daily).is_some_and(SentAlert::is_set) {
                    tracing::debug!(user, key = %daily, "daily alert already sent");
                    return Ok(false);
                }
                if !self.notify_security(user, &message) {
                    return Ok(false);
                }
                sent.insert(daily, SentAlert::Note(format_utc(&now)));
                sent.insert(
                    AlertKey::LastMessage(user).to_string(),
                    SentAlert::Note(message),
                );
                Ok(true)
            })
            .await
    }

    /// Run the dashboard rule over the whole activity log and persist the
    /// updated dedup records. Returns the newly raised messages.
    pub async fn scan_dashboard(&self) -> CloudResult<Vec<String>> {
        let entries = ActivityLog::new(self.state).entries().await;
        let messages = self
            .state
            .collections
            .update(Collection::SentAlerts, |sent: &mut SentAlerts| {
                Ok(detect_dashboard_anomalies(&entries, sent))
            })
            .await?;
        for message in &messages {
            tracing::warn!(%message, "dashboard anomaly");
        }
        Ok(messages)
    }

    pub async fn sent(&self) -> SentAlerts {
        self.state.collections.read(Collection::SentAlerts).await
    }
}
