// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transient plaintext files for delivery to the requester.
//!
//! A decrypted file that has to exist on disk (for a streaming response, for
//! example) is written into the scratch directory and owned by a
//! [`ScratchFile`]. Dropping the guard deletes the file, whichever way the
//! request ends.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use super::StorageResult;

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write plaintext to a fresh scratch file.
    pub fn materialize(&self, download_name: &str, plaintext: &[u8]) -> StorageResult<ScratchFile> {
        std::fs::create_dir_all(&self.dir)?;

        let mut file = tempfile::Builder::new()
            .prefix("dl-")
            .tempfile_in(&self.dir)?;
        file.write_all(plaintext)?;
        file.flush()?;

        Ok(ScratchFile {
            file,
            download_name: download_name.to_string(),
        })
    }

    /// Remove scratch files older than `max_age`, left behind by a process
    /// that did not shut down cleanly. Younger files may still be in use by
    /// another process sharing the data directory. Returns the number of
    /// files removed.
    pub fn purge_stale(&self, max_age: Duration) -> StorageResult<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let age = entry
                .metadata()?
                .modified()?
                .elapsed()
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "could not remove stale scratch file"
                ),
            }
        }
        Ok(removed)
    }
}

/// Scratch files older than this are left over from a crashed process.
pub const STALE_SCRATCH_AGE: Duration = Duration::from_secs(60 * 60);

/// Decrypted file on disk, deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
    download_name: String,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name to present to the requester (the original file name).
    pub fn download_name(&self) -> &str {
        &self.download_name
    }
}
