// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ciphertext blobs, one file per stored name.
//!
//! Blob changes that go with a metadata update are split in two steps so
//! the blob only changes once the metadata is saved: new content is staged
//! beside the blobs and published afterwards, and a removed blob is parked
//! and only deleted afterwards.

use std::io::{self, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;

use super::{LocalStorage, StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct BlobStore {
    storage: LocalStorage,
}

impl BlobStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    pub fn write(&self, stored_name: &str, ciphertext: &[u8]) -> StorageResult<()> {
        self.storage
            .write_raw(self.storage.paths().blob(stored_name), ciphertext)
    }

    pub fn read(&self, stored_name: &str) -> StorageResult<Vec<u8>> {
        self.storage.read_raw(self.storage.paths().blob(stored_name))
    }

    pub fn exists(&self, stored_name: &str) -> bool {
        self.storage.exists(self.storage.paths().blob(stored_name))
    }

    /// Remove a blob. Returns `false` if it was already gone.
    pub fn remove(&self, stored_name: &str) -> StorageResult<bool> {
        match self.storage.delete(self.storage.paths().blob(stored_name)) {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write ciphertext for `stored_name` without making it visible yet.
    pub fn stage(&self, stored_name: &str, ciphertext: &[u8]) -> StorageResult<StagedBlob> {
        let dir = self.storage.paths().blobs_dir();
        std::fs::create_dir_all(&dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(".staged-")
            .tempfile_in(&dir)?;
        file.write_all(ciphertext)?;
        file.as_file().sync_all()?;

        Ok(StagedBlob {
            file,
            target: self.storage.paths().blob(stored_name),
        })
    }

    /// Move a blob away from its stored name. `None` if there was no blob.
    pub fn detach(&self, stored_name: &str) -> StorageResult<Option<DetachedBlob>> {
        let path = self.storage.paths().blob(stored_name);
        let parked = self
            .storage
            .paths()
            .blobs_dir()
            .join(format!(".detached-{stored_name}"));

        match std::fs::rename(&path, &parked) {
            Ok(()) => Ok(Some(DetachedBlob {
                path,
                parked,
                discarded: false,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// New blob content on disk under a temporary name. Dropped without
/// [`StagedBlob::commit`], the data is removed.
#[derive(Debug)]
pub struct StagedBlob {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedBlob {
    /// Atomically replace the blob with the staged content.
    pub fn commit(self) -> StorageResult<()> {
        self.file
            .persist(&self.target)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

/// A blob moved aside. Dropped without [`DetachedBlob::discard`], it is put
/// back under its stored name.
#[derive(Debug)]
pub struct DetachedBlob {
    path: PathBuf,
    parked: PathBuf,
    discarded: bool,
}

impl DetachedBlob {
    pub fn discard(mut self) -> StorageResult<()> {
        self.discarded = true;
        std::fs::remove_file(&self.parked)?;
        Ok(())
    }
}

impl Drop for DetachedBlob {
    fn drop(&mut self) {
        if self.discarded {
            return;
        }
        if let Err(e) = std::fs::rename(&self.parked, &self.path) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "could not restore detached blob"
            );
        }
    }
}
