// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sliding-window rate limiting for expensive per-user queries.
//!
//! Request times are kept per key in a bounded LRU, so memory stays flat no
//! matter how many distinct users show up. An evicted key simply starts
//! with an empty window.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

use crate::clock::Clock;
use crate::error::{CloudError, CloudResult};

/// Keys tracked before the least recently used one is dropped.
pub const DEFAULT_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::seconds(60),
        }
    }
}

pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<LruCache<String, VecDeque<DateTime<Utc>>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(config, clock, DEFAULT_TRACKED_KEYS)
    }

    pub fn with_capacity(config: RateLimitConfig, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            clock,
            windows: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one request for `key`, or fail with `RateLimited` when the
    /// window is already full. Rejected requests are not counted.
    pub fn check(&self, key: &str) -> CloudResult<()> {
        let now = self.clock.now();
        let cutoff = now - self.config.window;

        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = windows.get_or_insert_mut(key.to_string(), VecDeque::new);
        while window.front().is_some_and(|at| *at <= cutoff) {
            window.pop_front();
        }

        if window.len() >= self.config.max_requests {
            let retry_after = window
                .front()
                .map(|oldest| (*oldest + self.config.window - now).num_seconds().max(1))
                .unwrap_or(1);
            tracing::warn!(key, retry_after, "rate limit exceeded");
            return Err(CloudError::RateLimited {
                retry_after_secs: retry_after as u64,
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Requests still allowed for `key` in the current window.
    pub fn remaining(&self, key: &str) -> usize {
        let cutoff = self.clock.now() - self.config.window;
        let windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let used = windows
            .peek(key)
            .map(|w| w.iter().filter(|at| **at > cutoff).count())
            .unwrap_or(0);
        self.config.max_requests.saturating_sub(used)
    }
}
