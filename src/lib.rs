// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SecureCloud Core - Encrypted Multi-Tenant File Storage
//!
//! Files are encrypted at rest with a single service key and owned by the
//! uploading user. Owners can organize files in folders, move them to a
//! trash, and share them with password-protected, expiring links. Every
//! operation feeds an activity log that drives anomaly alerts and an
//! access log that users can search.
//!
//! ## Modules
//!
//! - `service` - [`CloudService`], the entry point for callers
//! - `storage` - Collections, encrypted blobs, repositories
//! - `crypto` - File cipher, password hashing, session tokens
//! - `monitor` - Activity log, anomaly rules, alert dedup
//! - `search` - Access log filtering and pagination
//! - `config` - Environment configuration

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod rate_limit;
pub mod search;
pub mod service;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{CloudError, CloudResult};
pub use service::CloudService;
pub use state::AppState;
