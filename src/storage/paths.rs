// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk storage layout.

use std::path::{Path, PathBuf};

use super::Collection;

/// Default base directory for all persistent storage.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Collections ==========

    /// Directory holding one JSON document per collection.
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Path to a collection document.
    pub fn collection(&self, collection: Collection) -> PathBuf {
        self.db_dir().join(format!("{}.json", collection.name()))
    }

    /// Lock file guarding read-modify-write of a collection across processes.
    pub fn collection_lock(&self, collection: Collection) -> PathBuf {
        self.db_dir().join(format!("{}.lock", collection.name()))
    }

    /// Default location of the file encryption key.
    pub fn key_file(&self) -> PathBuf {
        self.db_dir().join("secret.key")
    }

    // ========== Blobs ==========

    /// Directory of encrypted file blobs.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("local_store")
    }

    /// Path to an encrypted blob.
    pub fn blob(&self, stored_name: &str) -> PathBuf {
        self.blobs_dir().join(stored_name)
    }

    // ========== Transient & Recovery ==========

    /// Scratch directory for decrypted files awaiting delivery.
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    /// Directory for pre-migration and quarantine copies.
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Backup copy of a collection tagged with a reason and timestamp.
    pub fn collection_backup(&self, collection: Collection, tag: &str) -> PathBuf {
        self.backups_dir()
            .join(format!("{}.{tag}.json", collection.name()))
    }
}
