// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Uniform load/save contract over named collections.
//!
//! Loading never fails: a missing or unreadable document is an empty
//! collection. Saving must be durable before it returns.

use std::fs::File;

use chrono::Utc;
use serde_json::Value;

use super::mirror::RedbMirror;
use super::{LocalStorage, StorageError, StorageResult};

/// Every persisted collection, in lock-acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Users,
    Files,
    Folders,
    Shares,
    ActivityLog,
    AccessLog,
    Otp,
    SentAlerts,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Files,
        Collection::Folders,
        Collection::Shares,
        Collection::ActivityLog,
        Collection::AccessLog,
        Collection::Otp,
        Collection::SentAlerts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Files => "files",
            Collection::Folders => "folders",
            Collection::Shares => "shares",
            Collection::ActivityLog => "activity_log",
            Collection::AccessLog => "access_log",
            Collection::Otp => "otp",
            Collection::SentAlerts => "sent_alerts",
        }
    }

    /// Log collections are ordered lists; the rest are keyed mappings.
    pub fn is_log(self) -> bool {
        matches!(self, Collection::ActivityLog | Collection::AccessLog)
    }

    pub fn empty(self) -> Value {
        if self.is_log() {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        }
    }

    fn accepts(self, value: &Value) -> bool {
        if self.is_log() {
            value.is_array()
        } else {
            value.is_object()
        }
    }
}

/// Held across one read-modify-write of a collection. Released on drop.
#[derive(Debug, Default)]
pub struct CollectionLock {
    _file: Option<File>,
}

/// Persistence seam for collection documents.
pub trait CollectionBackend: Send + Sync {
    fn load(&self, collection: Collection) -> Value;

    fn save(&self, collection: Collection, value: &Value) -> StorageResult<()>;

    /// Exclusive lock shared with every other process using the same store.
    /// Backends with a single writer need no lock.
    fn lock(&self, _collection: Collection) -> StorageResult<CollectionLock> {
        Ok(CollectionLock::default())
    }
}

/// One pretty-printed JSON document per collection under `db/`.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    storage: LocalStorage,
}

impl JsonFileBackend {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    /// The stored document, or `None` when it is absent or unusable.
    ///
    /// An unusable document is copied to the backups directory before it is
    /// reported as absent, so the next save cannot destroy the only copy.
    pub fn load_existing(&self, collection: Collection) -> Option<Value> {
        let path = self.storage.paths().collection(collection);
        match self.storage.read_json::<Value>(&path) {
            Ok(value) if collection.accepts(&value) => Some(value),
            Ok(_) => {
                self.quarantine(collection, "unexpected document shape");
                None
            }
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                self.quarantine(collection, &e.to_string());
                None
            }
        }
    }

    fn quarantine(&self, collection: Collection, reason: &str) {
        let source = self.storage.paths().collection(collection);
        let tag = format!("corrupted-{}", Utc::now().format("%Y%m%dT%H%M%S%.f"));
        let target = self.storage.paths().collection_backup(collection, &tag);
        match self.storage.copy(&source, &target) {
            Ok(()) => tracing::warn!(
                collection = collection.name(),
                reason,
                backup = %target.display(),
                "collection unreadable, treating as empty"
            ),
            Err(e) => tracing::error!(
                collection = collection.name(),
                reason,
                error = %e,
                "collection unreadable and could not be backed up"
            ),
        }
    }
}

impl CollectionBackend for JsonFileBackend {
    fn load(&self, collection: Collection) -> Value {
        self.load_existing(collection)
            .unwrap_or_else(|| collection.empty())
    }

    fn save(&self, collection: Collection, value: &Value) -> StorageResult<()> {
        self.storage
            .write_json(self.storage.paths().collection(collection), value)
    }

    fn lock(&self, collection: Collection) -> StorageResult<CollectionLock> {
        let file = self
            .storage
            .lock_file(self.storage.paths().collection_lock(collection))?;
        Ok(CollectionLock { _file: Some(file) })
    }
}

/// Local JSON files as source of truth, with an optional redb mirror that
/// receives every write on a best-effort basis.
#[derive(Debug)]
pub struct MirroredBackend {
    primary: JsonFileBackend,
    mirror: Option<RedbMirror>,
}

impl MirroredBackend {
    pub fn new(primary: JsonFileBackend, mirror: Option<RedbMirror>) -> Self {
        Self { primary, mirror }
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }
}

impl CollectionBackend for MirroredBackend {
    fn load(&self, collection: Collection) -> Value {
        if let Some(value) = self.primary.load_existing(collection) {
            return value;
        }

        if let Some(mirror) = &self.mirror {
            match mirror.load(collection) {
                Ok(Some(value)) if collection.accepts(&value) => {
                    tracing::info!(
                        collection = collection.name(),
                        "local collection missing, recovered from mirror"
                    );
                    return value;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    collection = collection.name(),
                    error = %e,
                    "mirror read failed"
                ),
            }
        }

        collection.empty()
    }

    fn save(&self, collection: Collection, value: &Value) -> StorageResult<()> {
        self.primary.save(collection, value)?;

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save(collection, value) {
                tracing::warn!(
                    collection = collection.name(),
                    error = %e,
                    "mirror write failed, local copy is authoritative"
                );
            }
        }
        Ok(())
    }

    fn lock(&self, collection: Collection) -> StorageResult<CollectionLock> {
        self.primary.lock(collection)
    }
}
