// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rule-based anomaly detection over the activity log.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::activity::{ActivityAction, ActivityEntry};
use super::alerts::{AlertKey, SentAlert, SentAlerts};

/// More deletions than this within the window raise an alert.
pub const DELETION_LIMIT: u64 = 2;
/// This many failed logins within the window raise an alert.
pub const FAILED_LOGIN_LIMIT: u64 = 3;
/// More total actions than this flag a user on the dashboard.
pub const HIGH_ACTIVITY_LIMIT: u64 = 10;

/// Action name → count.
pub type ActionCounts = BTreeMap<String, u64>;
/// User → action counts.
pub type UserStats = BTreeMap<String, ActionCounts>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyAlert {
    UnusualDeletions { count: u64 },
    RepeatedFailedLogins { count: u64 },
}

impl AnomalyAlert {
    /// Short identifier used in alert dedup keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnusualDeletions { .. } => "unusual_deletion",
            Self::RepeatedFailedLogins { .. } => "failed_login",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::UnusualDeletions { count } => {
                format!("Unusual number of deletions detected ({count} deletions).")
            }
            Self::RepeatedFailedLogins { count } => {
                format!("Multiple failed login attempts detected ({count} attempts).")
            }
        }
    }
}

/// Result of [`analyze_recent`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentActivity {
    pub stats: UserStats,
    pub alert: Option<AnomalyAlert>,
}

impl RecentActivity {
    /// Alert text, empty when nothing is anomalous.
    pub fn alert_message(&self) -> String {
        self.alert.map(|a| a.message()).unwrap_or_default()
    }

    pub fn stats_for(&self, user: &str) -> ActionCounts {
        self.stats.get(user).cloned().unwrap_or_default()
    }
}

/// Count actions per user inside `[now - window, now]` and evaluate the
/// alert rules for `user`.
///
/// Bulk entries count as their item count of the single-file action.
/// Entries with unreadable timestamps are ignored.
pub fn analyze_recent(
    entries: &[ActivityEntry],
    user: Option<&str>,
    window: Duration,
    now: DateTime<Utc>,
) -> RecentActivity {
    let cutoff = now - window;
    let mut stats = UserStats::new();

    for entry in entries {
        let Some(at) = entry.timestamp_utc() else {
            continue;
        };
        if at < cutoff || at > now {
            continue;
        }
        let (action, amount) = match entry.action.unbulked() {
            Some(single) => (single, entry.bulk_count()),
            None => (entry.action.clone(), 1),
        };
        *stats
            .entry(entry.user.clone())
            .or_default()
            .entry(action.as_str().to_string())
            .or_default() += amount;
    }

    let alert = user.and_then(|user| {
        let counts = stats.get(user)?;
        let count_of = |action: ActivityAction| counts.get(action.as_str()).copied().unwrap_or(0);

        let deletions = count_of(ActivityAction::Delete);
        let failed_logins = count_of(ActivityAction::FailedLogin);
        if deletions > DELETION_LIMIT {
            Some(AnomalyAlert::UnusualDeletions { count: deletions })
        } else if failed_logins >= FAILED_LOGIN_LIMIT {
            Some(AnomalyAlert::RepeatedFailedLogins {
                count: failed_logins,
            })
        } else {
            None
        }
    });

    RecentActivity { stats, alert }
}

/// Flag users with more than [`HIGH_ACTIVITY_LIMIT`] recorded actions.
///
/// Each user is flagged at most once: the dedup record is written into
/// `sent`, which the caller persists.
pub fn detect_dashboard_anomalies(entries: &[ActivityEntry], sent: &mut SentAlerts) -> Vec<String> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for entry in entries {
        *totals.entry(entry.user.as_str()).or_default() += 1;
    }

    let mut messages = Vec::new();
    for (user, count) in totals {
        if count <= HIGH_ACTIVITY_LIMIT {
            continue;
        }
        let key = AlertKey::Dashboard(user).to_string();
        if sent.get(&key).is_some_and(SentAlert::is_set) {
            continue;
        }
        sent.insert(key, SentAlert::Flag(true));
        messages.push(format!("High activity detected for {user} ({count} actions)"));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn entry(user: &str, action: &str, file: Option<&str>, minutes_ago: i64) -> ActivityEntry {
        ActivityEntry::new(
            user,
            ActivityAction::from(action.to_string()),
            file.map(str::to_string),
            now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn deletions_take_priority_over_failed_logins() {
        let mut entries = Vec::new();
        for i in 0..3 {
            entries.push(entry("alice@x.com", "delete", Some("f"), i));
        }
        for i in 0..5 {
            entries.push(entry("alice@x.com", "failed_login", None, i));
        }

        let recent = analyze_recent(&entries, Some("alice@x.com"), Duration::hours(24), now());
        assert_eq!(
            recent.alert_message(),
            "Unusual number of deletions detected (3 deletions)."
        );
    }

    #[test]
    fn failed_logins_alert_at_three() {
        let entries: Vec<_> = (0..3)
            .map(|i| entry("alice@x.com", "failed_login", None, i))
            .collect();

        let recent = analyze_recent(&entries, Some("alice@x.com"), Duration::hours(24), now());
        assert_eq!(
            recent.alert,
            Some(AnomalyAlert::RepeatedFailedLogins { count: 3 })
        );
        assert_eq!(
            recent.alert_message(),
            "Multiple failed login attempts detected (3 attempts)."
        );
    }

    #[test]
    fn two_deletions_are_normal() {
        let entries: Vec<_> = (0..2)
            .map(|i| entry("alice@x.com", "delete", Some("f"), i))
            .collect();

        let recent = analyze_recent(&entries, Some("alice@x.com"), Duration::hours(24), now());
        assert_eq!(recent.alert, None);
        assert_eq!(recent.alert_message(), "");
        assert_eq!(recent.stats_for("alice@x.com")["delete"], 2);
    }

    #[test]
    fn bulk_entries_expand_to_counts() {
        let entries = vec![
            entry("alice@x.com", "bulk_upload", Some("5 files"), 1),
            entry("alice@x.com", "upload", Some("a.txt"), 2),
            entry("alice@x.com", "bulk_download", Some("oops"), 3),
        ];

        let recent = analyze_recent(&entries, None, Duration::hours(24), now());
        let stats = recent.stats_for("alice@x.com");
        assert_eq!(stats["upload"], 6);
        assert_eq!(stats["download"], 1);
        assert!(!stats.contains_key("bulk_upload"));
        assert_eq!(recent.alert, None);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let entries = vec![
            entry("alice@x.com", "delete", Some("a"), 24 * 60),
            entry("alice@x.com", "delete", Some("b"), 24 * 60 + 1),
            entry("alice@x.com", "delete", Some("c"), 0),
            entry("alice@x.com", "delete", Some("d"), -1),
        ];

        let recent = analyze_recent(&entries, Some("alice@x.com"), Duration::hours(24), now());
        assert_eq!(recent.stats_for("alice@x.com")["delete"], 2);
    }

    #[test]
    fn naive_and_garbage_timestamps() {
        let mut naive = entry("alice@x.com", "delete", None, 0);
        naive.timestamp = "2024-06-01T11:00:00".into();
        let mut garbage = entry("alice@x.com", "delete", None, 0);
        garbage.timestamp = "not a time".into();

        let recent = analyze_recent(&[naive, garbage], None, Duration::hours(24), now());
        assert_eq!(recent.stats_for("alice@x.com")["delete"], 1);
    }

    #[test]
    fn rules_apply_only_to_requested_user() {
        let entries: Vec<_> = (0..4)
            .map(|i| entry("bob@x.com", "delete", Some("f"), i))
            .collect();

        let recent = analyze_recent(&entries, Some("alice@x.com"), Duration::hours(24), now());
        assert_eq!(recent.alert, None);
        assert_eq!(recent.stats_for("bob@x.com")["delete"], 4);
    }

    #[test]
    fn dashboard_flags_busy_users_once() {
        let mut entries: Vec<_> = (0..11)
            .map(|i| entry("alice@x.com", "download", Some("f"), i))
            .collect();
        entries.extend((0..10).map(|i| entry("bob@x.com", "download", Some("f"), i)));
        let mut sent = SentAlerts::new();

        let first = detect_dashboard_anomalies(&entries, &mut sent);
        assert_eq!(
            first,
            vec!["High activity detected for alice@x.com (11 actions)".to_string()]
        );
        assert!(sent.contains_key("alice@x.com_high_activity_dashboard"));

        assert!(detect_dashboard_anomalies(&entries, &mut sent).is_empty());
    }

    #[test]
    fn cleared_dashboard_marker_flags_again() {
        let entries: Vec<_> = (0..11)
            .map(|i| entry("alice@x.com", "upload", Some("f"), i))
            .collect();
        let mut sent = SentAlerts::new();
        sent.insert(
            "alice@x.com_high_activity_dashboard".into(),
            SentAlert::Flag(false),
        );

        assert_eq!(detect_dashboard_anomalies(&entries, &mut sent).len(), 1);
        assert_eq!(
            sent["alice@x.com_high_activity_dashboard"],
            SentAlert::Flag(true)
        );
    }
}
