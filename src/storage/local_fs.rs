// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local filesystem operations for collections and blobs.
//!
//! All writes go to a uniquely named temp file in the target directory, are
//! flushed to disk, and are then renamed over the destination. Readers never
//! observe a partially written collection or blob.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use super::mirror::MirrorError;
use super::StoragePaths;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage not initialized")]
    NotInitialized,

    #[error("health check data mismatch")]
    IntegrityViolation,

    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Local storage manager rooted at the data directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    paths: StoragePaths,
    initialized: bool,
}

impl LocalStorage {
    /// Does NOT create the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Create the directory layout. Idempotent.
    pub fn initialize(&mut self) -> StorageResult<()> {
        let dirs = [
            self.paths.db_dir(),
            self.paths.blobs_dir(),
            self.paths.scratch_dir(),
            self.paths.backups_dir(),
        ];
        for dir in dirs {
            fs::create_dir_all(&dir)?;
        }

        self.initialized = true;
        Ok(())
    }

    /// Write, read back and delete a marker file in the data directory.
    pub fn health_check(&self) -> StorageResult<()> {
        self.ensure_initialized()?;

        let marker = self.paths.root().join(".health_check");
        let expected = b"health_check_data";
        fs::write(&marker, expected)?;
        let read_back = fs::read(&marker)?;
        fs::remove_file(&marker)?;

        if read_back != expected {
            return Err(StorageError::IntegrityViolation);
        }
        Ok(())
    }

    // ========== JSON ==========

    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StorageResult<T> {
        self.ensure_initialized()?;

        let file = open(path.as_ref())?;
        let value = serde_json::from_reader(BufReader::new(file))?;
        Ok(value)
    }

    /// Atomically replace a JSON document.
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StorageResult<()> {
        self.ensure_initialized()?;

        self.replace_with(path.as_ref(), |writer| {
            serde_json::to_writer_pretty(&mut *writer, value)?;
            Ok(())
        })
    }

    // ========== Raw bytes ==========

    /// Atomically replace a file with raw bytes.
    pub fn write_raw(&self, path: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
        self.ensure_initialized()?;

        self.replace_with(path.as_ref(), |writer| {
            writer.write_all(data)?;
            Ok(())
        })
    }

    pub fn read_raw(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        fs::read(path).map_err(|e| not_found_or_io(e, path))
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    /// Delete a file. A missing file is reported as `NotFound`.
    pub fn delete(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        fs::remove_file(path).map_err(|e| not_found_or_io(e, path))
    }

    /// Copy a file aside (quarantine, pre-migration backup).
    pub fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> StorageResult<()> {
        self.ensure_initialized()?;

        let to = to.as_ref();
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from.as_ref(), to)?;
        Ok(())
    }

    /// Open `path` and block until this handle holds an exclusive advisory
    /// lock on it. Dropping the handle releases the lock.
    pub fn lock_file(&self, path: impl AsRef<Path>) -> StorageResult<File> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock()?;
        Ok(file)
    }

    /// List regular file names in a directory.
    pub fn list_files(&self, dir: impl AsRef<Path>) -> StorageResult<Vec<String>> {
        self.ensure_initialized()?;

        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    fn replace_with<F>(&self, path: &Path, write: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> StorageResult<()>,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = temp_sibling(path);
        let result: StorageResult<()> = (|| {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            write(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp_path, path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

fn open(path: &Path) -> StorageResult<File> {
    File::open(path).map_err(|e| not_found_or_io(e, path))
}

fn not_found_or_io(e: io::Error, path: &Path) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        StorageError::NotFound(name)
    } else {
        StorageError::Io(e)
    }
}

/// Hidden, uniquely named sibling so concurrent writers of different
/// targets never share a temp file.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}
