// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded collection mirror backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `collections`: collection name → serialized document (JSON bytes)
//!
//! The mirror is secondary. The local JSON files stay authoritative and the
//! mirror is consulted only when a local document is missing.

use std::path::Path;

use redb::{Database, ReadableDatabase, TableDefinition};
use serde_json::Value;

use super::Collection;

/// Collection name → serialized JSON document.
const COLLECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("collections");

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type MirrorResult<T> = Result<T, MirrorError>;

pub struct RedbMirror {
    db: Database,
}

impl std::fmt::Debug for RedbMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbMirror").finish_non_exhaustive()
    }
}

impl RedbMirror {
    /// Open (or create) the mirror database at the given path.
    pub fn open(path: &Path) -> MirrorResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(COLLECTIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Replace the mirrored copy of a collection.
    pub fn save(&self, collection: Collection, value: &Value) -> MirrorResult<()> {
        let json = serde_json::to_vec(value)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(COLLECTIONS)?;
            table.insert(collection.name(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Mirrored copy of a collection, if one was ever written.
    pub fn load(&self, collection: Collection) -> MirrorResult<Option<Value>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COLLECTIONS)?;
        match table.get(collection.name())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }
}
