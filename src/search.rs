// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filtered, paginated search over access and activity entries.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{parse_date, parse_utc};
use crate::error::{CloudError, CloudResult};
use crate::monitor::ActivityEntry;
use crate::storage::AccessLogEntry;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 1000;

/// Search criteria. Blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Exact action name, case-insensitive.
    #[serde(default, alias = "type")]
    pub action: Option<String>,
    /// Inclusive lower bound: `YYYY-MM-DD` or a full timestamp.
    #[serde(default)]
    pub start: Option<String>,
    /// Inclusive upper bound: `YYYY-MM-DD` (end of day) or a full timestamp.
    #[serde(default)]
    pub end: Option<String>,
    /// File extension, with or without the leading dot.
    #[serde(default)]
    pub file_type: Option<String>,
    /// Case-insensitive substring of the file name.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Case-insensitive substring of a share recipient.
    #[serde(default)]
    pub receiver_email: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// One page of results, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPage {
    pub entries: Vec<AccessLogEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

impl From<ActivityEntry> for AccessLogEntry {
    fn from(entry: ActivityEntry) -> Self {
        Self {
            user: entry.user,
            action: entry.action.into(),
            file: entry.file.unwrap_or_default(),
            timestamp: entry.timestamp,
            meta: None,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Parse a range bound. A bare date covers the whole day.
fn parse_bound(raw: &str, bound: Bound) -> CloudResult<DateTime<Utc>> {
    let raw = raw.trim();
    if !raw.contains('T') {
        if let Some(date) = parse_date(raw) {
            let time = match bound {
                Bound::Start => NaiveTime::MIN,
                Bound::End => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
            };
            return Ok(date.and_time(time).and_utc());
        }
    }
    parse_utc(raw).ok_or_else(|| {
        let which = match bound {
            Bound::Start => "start",
            Bound::End => "end",
        };
        CloudError::validation(format!("invalid {which} date: {raw}"))
    })
}

/// Filter, sort and paginate `entries`.
///
/// Fails only when a date bound cannot be parsed.
pub fn query(entries: Vec<AccessLogEntry>, filter: &LogFilter) -> CloudResult<LogPage> {
    let start = filter
        .start
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_bound(s, Bound::Start))
        .transpose()?;
    let end = filter
        .end
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_bound(s, Bound::End))
        .transpose()?;
    let action = non_blank(&filter.action);
    let extension = non_blank(&filter.file_type)
        .map(|ext| format!(".{}", ext.trim_start_matches('.')));
    let file_name = non_blank(&filter.file_name);
    let receiver = non_blank(&filter.receiver_email);

    let mut matched: Vec<(Option<DateTime<Utc>>, AccessLogEntry)> = entries
        .into_iter()
        .map(|entry| (entry.timestamp_utc(), entry))
        .filter(|(at, entry)| {
            if let Some(action) = &action {
                if entry.action.to_lowercase() != *action {
                    return false;
                }
            }
            if start.is_some() || end.is_some() {
                let Some(at) = at else {
                    return false;
                };
                if start.is_some_and(|s| *at < s) || end.is_some_and(|e| *at > e) {
                    return false;
                }
            }
            let file = entry.file.to_lowercase();
            if let Some(ext) = &extension {
                if file.is_empty() || !file.ends_with(ext.as_str()) {
                    return false;
                }
            }
            if let Some(name) = &file_name {
                if file.is_empty() || !file.contains(name.as_str()) {
                    return false;
                }
            }
            if let Some(receiver) = &receiver {
                let hit = entry
                    .receiver_emails()
                    .iter()
                    .any(|email| email.to_lowercase().contains(receiver.as_str()));
                if !hit {
                    return false;
                }
            }
            true
        })
        .collect();

    // Newest first; entries without a readable timestamp go last.
    matched.sort_by(|a, b| b.0.cmp(&a.0));

    let total = matched.len();
    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;
    let offset = filter.offset.unwrap_or(0).max(0) as usize;
    let entries = matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|(_, entry)| entry)
        .collect();

    Ok(LogPage {
        entries,
        total,
        limit,
        offset,
        has_more: offset + limit < total,
    })
}
