// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound notifications (OTP codes, share links, security alerts).
//!
//! Delivery is best effort. A sink reports whether it accepted the message
//! and callers decide what a failure means for them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Destination for user notifications, typically email.
pub trait NotificationSink: Send + Sync {
    /// Returns `true` when the message was accepted for delivery.
    fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        // The body may carry an OTP; keep it out of info-level output.
        tracing::info!(to, subject, "notification");
        tracing::trace!(to, body, "notification body");
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every accepted notification in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (and record nothing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, to: &str) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.to == to).collect()
    }
}

impl NotificationSink for MemorySink {
    fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        let notification = Notification {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        true
    }
}
