// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives under the data directory:
//!
//! ```text
//! /data/
//!   db/
//!     users.json         # accounts and lockout state
//!     files.json         # file metadata, keyed by stored name
//!     folders.json       # folders, keyed by owner:path
//!     shares.json        # share links, keyed by token
//!     activity_log.json  # activity entries (list)
//!     access_log.json    # access entries (list)
//!     otp.json           # live one-time codes
//!     sent_alerts.json   # alert dedup records
//!     secret.key         # file encryption key (hex)
//!   local_store/
//!     {stored_name}      # encrypted blobs
//!   temp/                # transient plaintext, removed after delivery
//!   backups/             # pre-migration and quarantine copies
//! ```
//!
//! Collections are whole JSON documents replaced atomically on every write.
//! An optional redb mirror keeps a second copy.

pub mod audit;
pub mod backend;
pub mod blobs;
pub mod collections;
pub mod local_fs;
pub mod migration;
pub mod mirror;
pub mod ownership;
pub mod paths;
pub mod repository;
pub mod scratch;

pub use audit::{AccessLog, AccessLogEntry, AccessMeta};
pub use backend::{Collection, CollectionBackend, CollectionLock, JsonFileBackend, MirroredBackend};
pub use blobs::{BlobStore, DetachedBlob, StagedBlob};
pub use collections::Collections;
pub use local_fs::{LocalStorage, StorageError, StorageResult};
pub use mirror::{MirrorError, RedbMirror};
pub use ownership::{OwnedResource, OwnershipCheck};
pub use paths::StoragePaths;
pub use scratch::{ScratchFile, ScratchSpace, STALE_SCRATCH_AGE};
