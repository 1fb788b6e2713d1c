// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File metadata and encrypted blob lifecycle.
//!
//! A file is addressed by its stored name, derived from owner and original
//! name. Uploading the same name twice replaces the earlier file. Deletion
//! is a soft delete into the trash; only a permanent delete or the trash
//! sweep removes the blob.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CloudError, CloudResult};
use crate::state::AppState;
use crate::storage::{
    Collection, DetachedBlob, OwnedResource, OwnershipCheck, StagedBlob, StorageError,
};

pub const ROOT_FOLDER: &str = "/";

fn root_folder() -> String {
    ROOT_FOLDER.to_string()
}

/// Persisted metadata of one file, keyed by stored name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub owner: String,
    pub original_name: String,
    #[serde(with = "crate::clock::utc")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(default = "root_folder")]
    pub folder: String,
    /// Plaintext size in bytes.
    #[serde(default)]
    pub size: u64,
    #[serde(
        default,
        with = "crate::clock::utc_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn extension(&self) -> Option<String> {
        file_extension(&self.original_name)
    }
}

impl OwnedResource for FileRecord {
    fn owner(&self) -> &str {
        &self.owner
    }
}

/// The `files` collection.
pub type FileIndex = BTreeMap<String, FileRecord>;

/// A record together with its key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredFile {
    pub stored_name: String,
    #[serde(flatten)]
    pub record: FileRecord,
}

/// Decrypted content. The buffer is wiped when dropped.
pub struct DecryptedFile {
    pub original_name: String,
    pub stored_name: String,
    pub content: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for DecryptedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedFile")
            .field("original_name", &self.original_name)
            .field("stored_name", &self.stored_name)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Filters for [`FileRepository::search`].
#[derive(Debug, Clone, Default)]
pub struct FileSearch {
    /// Case-insensitive substring of the original name.
    pub query: Option<String>,
    /// Extension with or without the leading dot.
    pub extension: Option<String>,
    /// Exact folder path.
    pub folder: Option<String>,
    pub uploaded_from: Option<DateTime<Utc>>,
    pub uploaded_to: Option<DateTime<Utc>>,
}

/// Stored name for a user's file.
///
/// Deterministic, so re-uploading a name overwrites the earlier file.
pub fn stored_name(owner: &str, original_name: &str) -> String {
    format!("{}_{}", owner.replace('@', "_at_"), original_name)
}

/// Lowercased extension after the last dot.
pub fn file_extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Reject names that could escape the blob directory or are empty.
pub fn validate_file_name(name: &str) -> CloudResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CloudError::validation("file name is required"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(CloudError::validation(format!("invalid file name: {name}")));
    }
    Ok(name)
}

/// Canonical absolute folder path (`/`, `/a`, `/a/b`).
pub fn normalize_folder(path: &str) -> CloudResult<String> {
    let path = path.trim();
    if path.is_empty() || path == ROOT_FOLDER {
        return Ok(root_folder());
    }
    if !path.starts_with('/') {
        return Err(CloudError::validation(format!(
            "folder path must be absolute: {path}"
        )));
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == ".." || s.contains('\\')) {
        return Err(CloudError::validation(format!("invalid folder path: {path}")));
    }
    if segments.is_empty() {
        return Ok(root_folder());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// `true` if `path` is `prefix` or lies underneath it.
pub(crate) fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
        || prefix == ROOT_FOLDER
}

/// Resolve a user-supplied name to a key: original name first, then
/// stored name. Only the owner's records are considered.
fn resolve_key(index: &FileIndex, owner: &str, name: &str) -> Option<String> {
    index
        .iter()
        .find(|(_, r)| r.owner == owner && r.original_name == name)
        .or_else(|| index.get_key_value(name).filter(|(_, r)| r.owner == owner))
        .map(|(key, _)| key.clone())
}

pub struct FileRepository<'a> {
    state: &'a AppState,
}

impl<'a> FileRepository<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Encrypt and store a file, replacing any earlier file of that name.
    pub async fn upload(
        &self,
        owner: &str,
        original_name: &str,
        folder: &str,
        content: &[u8],
    ) -> CloudResult<StoredFile> {
        let original_name = validate_file_name(original_name)?.to_string();
        let folder = normalize_folder(folder)?;
        let key = stored_name(owner, &original_name);

        let ciphertext = self.state.cipher.encrypt(content)?;
        let record = FileRecord {
            owner: owner.to_string(),
            original_name,
            uploaded_at: self.state.clock.now(),
            folder,
            size: content.len() as u64,
            deleted_at: None,
        };

        let staged = self.state.blobs.stage(&key, &ciphertext)?;
        self.state
            .collections
            .update_then(
                Collection::Files,
                |index: &mut FileIndex| {
                    if let Some(existing) = index.get(&key) {
                        if existing.owner != record.owner {
                            return Err(CloudError::conflict(format!(
                                "file name {} is unavailable",
                                record.original_name
                            )));
                        }
                    }
                    index.insert(key.clone(), record.clone());
                    Ok(staged)
                },
                |staged: StagedBlob| Ok(staged.commit()?),
            )
            .await?;

        tracing::info!(stored_name = %key, size = record.size, "file stored");
        Ok(StoredFile {
            stored_name: key,
            record,
        })
    }

    /// Active files in exactly `folder`.
    pub async fn list(&self, owner: &str, folder: &str) -> CloudResult<Vec<StoredFile>> {
        let folder = normalize_folder(folder)?;
        Ok(self
            .collect(|r| r.owner == owner && !r.is_trashed() && r.folder == folder)
            .await)
    }

    /// Trashed files, most recently deleted first.
    pub async fn list_trash(&self, owner: &str) -> Vec<StoredFile> {
        let mut files = self.collect(|r| r.owner == owner && r.is_trashed()).await;
        files.sort_by(|a, b| b.record.deleted_at.cmp(&a.record.deleted_at));
        files
    }

    /// Number of active files.
    pub async fn count_active(&self, owner: &str) -> usize {
        self.collect(|r| r.owner == owner && !r.is_trashed())
            .await
            .len()
    }

    /// Decrypt one of the owner's active files.
    pub async fn download(&self, owner: &str, name: &str) -> CloudResult<DecryptedFile> {
        let index: FileIndex = self.state.collections.read(Collection::Files).await;
        let key = resolve_key(&index, owner, name).ok_or_else(|| CloudError::not_found("file"))?;
        let record = index
            .get(&key)
            .filter(|r| !r.is_trashed())
            .owned_by(owner, "file")?;

        self.open_blob(&key, &record.original_name)
    }

    /// Decrypt a blob by stored name.
    pub(crate) fn open_blob(&self, key: &str, original_name: &str) -> CloudResult<DecryptedFile> {
        let ciphertext = match self.state.blobs.read(key) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(stored_name = %key, "metadata references a missing blob");
                return Err(CloudError::not_found("file"));
            }
            Err(e) => return Err(e.into()),
        };
        let content = self.state.cipher.decrypt(&ciphertext)?;

        Ok(DecryptedFile {
            original_name: original_name.to_string(),
            stored_name: key.to_string(),
            content,
        })
    }

    /// Resolve an active file for sharing.
    pub(crate) async fn find_active(&self, owner: &str, name: &str) -> CloudResult<StoredFile> {
        let index: FileIndex = self.state.collections.read(Collection::Files).await;
        let key = resolve_key(&index, owner, name).ok_or_else(|| CloudError::not_found("file"))?;
        let record = index
            .get(&key)
            .filter(|r| !r.is_trashed())
            .owned_by(owner, "file")?
            .clone();
        Ok(StoredFile {
            stored_name: key,
            record,
        })
    }

    /// Move a file to the trash. `true` only if it was active.
    pub async fn delete(&self, owner: &str, name: &str) -> CloudResult<bool> {
        let now = self.state.clock.now();
        let trashed = self
            .state
            .collections
            .update(Collection::Files, |index: &mut FileIndex| {
                let Some(key) = resolve_key(index, owner, name) else {
                    return Ok(false);
                };
                match index.get_mut(&key) {
                    Some(record) if !record.is_trashed() => {
                        record.deleted_at = Some(now);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
            .await?;

        if trashed {
            tracing::info!(file = %name, "file moved to trash");
        }
        Ok(trashed)
    }

    /// Bring a file back from the trash. `true` only if it was trashed.
    pub async fn restore(&self, owner: &str, name: &str) -> CloudResult<bool> {
        self.state
            .collections
            .update(Collection::Files, |index: &mut FileIndex| {
                let Some(key) = resolve_key(index, owner, name) else {
                    return Ok(false);
                };
                match index.get_mut(&key) {
                    Some(record) if record.is_trashed() => {
                        record.deleted_at = None;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
            .await
    }

    /// Remove record and blob, trashed or not.
    pub async fn permanently_delete(&self, owner: &str, name: &str) -> CloudResult<bool> {
        let blobs = &self.state.blobs;
        self.state
            .collections
            .update_then(
                Collection::Files,
                |index: &mut FileIndex| {
                    let Some(key) = resolve_key(index, owner, name) else {
                        return Ok(None);
                    };
                    let detached = blobs.detach(&key)?;
                    if detached.is_none() {
                        tracing::warn!(stored_name = %key, "blob already missing");
                    }
                    index.remove(&key);
                    Ok(Some(detached))
                },
                |removed: Option<Option<DetachedBlob>>| {
                    let found = removed.is_some();
                    discard_blobs(removed.flatten());
                    Ok(found)
                },
            )
            .await
    }

    /// Permanently delete everything in the owner's trash.
    pub async fn empty_trash(&self, owner: &str) -> CloudResult<usize> {
        self.sweep(|r| r.owner == owner && r.is_trashed()).await
    }

    /// Remove trashed files whose whole-day age is at least `max_age_days`.
    pub async fn cleanup_trash(&self, max_age_days: i64) -> CloudResult<usize> {
        let now = self.state.clock.now();
        let removed = self
            .sweep(|r| {
                r.deleted_at
                    .is_some_and(|at| (now - at).num_days() >= max_age_days)
            })
            .await?;
        tracing::info!(removed, max_age_days, "trash sweep finished");
        Ok(removed)
    }

    /// Reassign a file to another folder.
    pub async fn move_file(&self, owner: &str, name: &str, target: &str) -> CloudResult<StoredFile> {
        let target = normalize_folder(target)?;
        self.state
            .collections
            .update(Collection::Files, |index: &mut FileIndex| {
                let key =
                    resolve_key(index, owner, name).ok_or_else(|| CloudError::not_found("file"))?;
                let record = index
                    .get_mut(&key)
                    .filter(|r| !r.is_trashed())
                    .owned_by(owner, "file")?;
                record.folder = target.clone();
                Ok(StoredFile {
                    stored_name: key,
                    record: record.clone(),
                })
            })
            .await
    }

    /// Search the owner's active files, newest first.
    pub async fn search(&self, owner: &str, search: &FileSearch) -> CloudResult<Vec<StoredFile>> {
        let query = search.query.as_deref().map(str::to_lowercase);
        let extension = search
            .extension
            .as_deref()
            .map(|e| e.trim_start_matches('.').to_lowercase());
        let folder = search.folder.as_deref().map(normalize_folder).transpose()?;

        let mut files = self
            .collect(|r| {
                r.owner == owner
                    && !r.is_trashed()
                    && query
                        .as_deref()
                        .is_none_or(|q| r.original_name.to_lowercase().contains(q))
                    && extension
                        .as_deref()
                        .is_none_or(|e| r.extension().as_deref() == Some(e))
                    && folder.as_deref().is_none_or(|f| r.folder == f)
                    && search.uploaded_from.is_none_or(|from| r.uploaded_at >= from)
                    && search.uploaded_to.is_none_or(|to| r.uploaded_at <= to)
            })
            .await;
        files.sort_by(|a, b| b.record.uploaded_at.cmp(&a.record.uploaded_at));
        Ok(files)
    }

    async fn collect(&self, keep: impl Fn(&FileRecord) -> bool) -> Vec<StoredFile> {
        let index: FileIndex = self.state.collections.read(Collection::Files).await;
        let mut files: Vec<StoredFile> = index
            .into_iter()
            .filter(|(_, r)| keep(r))
            .map(|(stored_name, record)| StoredFile {
                stored_name,
                record,
            })
            .collect();
        files.sort_by(|a, b| a.record.original_name.cmp(&b.record.original_name));
        files
    }

    /// Remove matching records and their blobs. A record whose blob cannot
    /// be removed stays for the next sweep.
    async fn sweep(&self, matches: impl Fn(&FileRecord) -> bool) -> CloudResult<usize> {
        let blobs = &self.state.blobs;
        self.state
            .collections
            .update_then(
                Collection::Files,
                |index: &mut FileIndex| {
                    let doomed: Vec<String> = index
                        .iter()
                        .filter(|(_, r)| matches(r))
                        .map(|(k, _)| k.clone())
                        .collect();

                    let mut detached = Vec::new();
                    let mut removed = 0;
                    for key in doomed {
                        match blobs.detach(&key) {
                            Ok(blob) => {
                                detached.extend(blob);
                                index.remove(&key);
                                removed += 1;
                            }
                            Err(e) => {
                                tracing::warn!(stored_name = %key, error = %e, "could not remove blob, keeping record");
                            }
                        }
                    }
                    Ok((removed, detached))
                },
                |(removed, detached): (usize, Vec<DetachedBlob>)| {
                    discard_blobs(detached);
                    Ok(removed)
                },
            )
            .await
    }
}

/// Delete blobs whose records are already gone. A failure leaves an
/// orphaned file behind, never a dangling record.
fn discard_blobs(blobs: impl IntoIterator<Item = DetachedBlob>) {
    for blob in blobs {
        if let Err(e) = blob.discard() {
            tracing::warn!(error = %e, "could not delete detached blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{context, context_with_mirror};
    use chrono::Duration;
    use serde_json::{json, Value};

    #[test]
    fn stored_names_are_deterministic() {
        assert_eq!(stored_name("alice@x.com", "a.txt"), "alice_at_x.com_a.txt");
        assert_eq!(
            stored_name("alice@x.com", "a.txt"),
            stored_name("alice@x.com", "a.txt")
        );
    }

    #[test]
    fn file_names_are_validated() {
        assert_eq!(validate_file_name("  a.txt ").unwrap(), "a.txt");
        for bad in ["", "   ", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(validate_file_name(bad), Err(CloudError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn folders_are_normalized() {
        assert_eq!(normalize_folder("").unwrap(), "/");
        assert_eq!(normalize_folder("/").unwrap(), "/");
        assert_eq!(normalize_folder("/a/b/").unwrap(), "/a/b");
        assert_eq!(normalize_folder("//a//b").unwrap(), "/a/b");
        assert!(normalize_folder("a/b").is_err());
        assert!(normalize_folder("/a/../b").is_err());
    }

    #[test]
    fn prefix_matching_respects_segments() {
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a/x", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(file_extension("Report.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("README"), None);
    }

    #[tokio::test]
    async fn upload_then_download_roundtrips() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);

        let stored = files
            .upload("alice@x.com", "a.txt", "/", b"hello")
            .await
            .unwrap();
        assert_eq!(stored.stored_name, "alice_at_x.com_a.txt");
        assert_eq!(stored.record.size, 5);

        let by_original = files.download("alice@x.com", "a.txt").await.unwrap();
        assert_eq!(by_original.content.as_slice(), b"hello");

        let by_stored = files
            .download("alice@x.com", "alice_at_x.com_a.txt")
            .await
            .unwrap();
        assert_eq!(by_stored.original_name, "a.txt");
    }

    #[tokio::test]
    async fn blobs_are_encrypted_at_rest() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files
            .upload("alice@x.com", "a.txt", "/", b"plain secret text")
            .await
            .unwrap();

        let raw = ctx.state.blobs.read("alice_at_x.com_a.txt").unwrap();
        assert!(!raw
            .windows(b"plain secret text".len())
            .any(|w| w == b"plain secret text"));
    }

    #[tokio::test]
    async fn reupload_replaces_content() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"v1").await.unwrap();
        files.upload("alice@x.com", "a.txt", "/", b"v2").await.unwrap();

        let file = files.download("alice@x.com", "a.txt").await.unwrap();
        assert_eq!(file.content.as_slice(), b"v2");
        assert_eq!(files.count_active("alice@x.com").await, 1);
    }

    #[tokio::test]
    async fn other_owners_cannot_see_files() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"x").await.unwrap();

        assert!(matches!(
            files.download("bob@x.com", "a.txt").await,
            Err(CloudError::NotFound(_))
        ));
        assert!(matches!(
            files.download("bob@x.com", "alice_at_x.com_a.txt").await,
            Err(CloudError::NotFound(_))
        ));
        assert!(!files.delete("bob@x.com", "a.txt").await.unwrap());
        assert!(!files.permanently_delete("bob@x.com", "a.txt").await.unwrap());
        assert!(matches!(
            files.move_file("bob@x.com", "a.txt", "/x").await,
            Err(CloudError::NotFound(_))
        ));
        assert!(files.list("bob@x.com", "/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn colliding_stored_name_from_other_owner_is_rejected() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("a@b", "c_d", "/", b"first").await.unwrap();

        let result = files.upload("a@b_c", "d", "/", b"second").await;
        assert!(matches!(result, Err(CloudError::Conflict(_))));
        let kept = files.download("a@b", "c_d").await.unwrap();
        assert_eq!(kept.content.as_slice(), b"first");
    }

    #[tokio::test]
    async fn soft_delete_lifecycle() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"x").await.unwrap();

        assert!(files.delete("alice@x.com", "a.txt").await.unwrap());
        assert!(!files.delete("alice@x.com", "a.txt").await.unwrap());
        assert!(files.list("alice@x.com", "/").await.unwrap().is_empty());
        assert_eq!(files.list_trash("alice@x.com").await.len(), 1);
        assert!(files.download("alice@x.com", "a.txt").await.is_err());

        assert!(files.restore("alice@x.com", "a.txt").await.unwrap());
        assert!(!files.restore("alice@x.com", "a.txt").await.unwrap());
        let file = files.download("alice@x.com", "a.txt").await.unwrap();
        assert_eq!(file.content.as_slice(), b"x");

        assert!(files.delete("alice@x.com", "a.txt").await.unwrap());
        assert!(files.permanently_delete("alice@x.com", "a.txt").await.unwrap());
        assert!(matches!(
            files.download("alice@x.com", "a.txt").await,
            Err(CloudError::NotFound(_))
        ));
        assert!(!ctx.state.blobs.exists("alice_at_x.com_a.txt"));
        assert!(!files.permanently_delete("alice@x.com", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn trash_sweep_respects_age_threshold() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "old.txt", "/", b"x").await.unwrap();
        files.upload("alice@x.com", "new.txt", "/", b"y").await.unwrap();
        files.upload("alice@x.com", "kept.txt", "/", b"z").await.unwrap();

        files.delete("alice@x.com", "old.txt").await.unwrap();
        ctx.clock.advance(Duration::days(20));
        files.delete("alice@x.com", "new.txt").await.unwrap();

        ctx.clock.advance(Duration::days(10) - Duration::seconds(1));
        assert_eq!(files.cleanup_trash(30).await.unwrap(), 0);

        ctx.clock.advance(Duration::seconds(1));
        assert_eq!(files.cleanup_trash(30).await.unwrap(), 1);

        let trash = files.list_trash("alice@x.com").await;
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].record.original_name, "new.txt");
        assert!(!ctx.state.blobs.exists("alice_at_x.com_old.txt"));
        assert_eq!(files.count_active("alice@x.com").await, 1);
    }

    #[tokio::test]
    async fn empty_trash_only_touches_owner() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"x").await.unwrap();
        files.upload("bob@x.com", "b.txt", "/", b"y").await.unwrap();
        files.delete("alice@x.com", "a.txt").await.unwrap();
        files.delete("bob@x.com", "b.txt").await.unwrap();

        assert_eq!(files.empty_trash("alice@x.com").await.unwrap(), 1);
        assert_eq!(files.list_trash("bob@x.com").await.len(), 1);
    }

    #[tokio::test]
    async fn move_and_list_by_folder() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"x").await.unwrap();

        let moved = files
            .move_file("alice@x.com", "a.txt", "/docs/")
            .await
            .unwrap();
        assert_eq!(moved.record.folder, "/docs");
        assert!(files.list("alice@x.com", "/").await.unwrap().is_empty());
        assert_eq!(files.list("alice@x.com", "/docs").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_filters_combine() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "Report.PDF", "/", b"1").await.unwrap();
        ctx.clock.advance(Duration::hours(1));
        files.upload("alice@x.com", "report.txt", "/work", b"2").await.unwrap();
        files.upload("alice@x.com", "photo.png", "/", b"3").await.unwrap();

        let by_query = files
            .search(
                "alice@x.com",
                &FileSearch {
                    query: Some("REPORT".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_query.len(), 2);
        assert_eq!(by_query[0].record.original_name, "report.txt");

        let by_ext = files
            .search(
                "alice@x.com",
                &FileSearch {
                    extension: Some(".pdf".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_ext.len(), 1);

        let in_folder = files
            .search(
                "alice@x.com",
                &FileSearch {
                    query: Some("report".into()),
                    folder: Some("/work".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(in_folder.len(), 1);
        assert_eq!(in_folder[0].record.folder, "/work");
    }

    #[tokio::test]
    async fn unreadable_record_does_not_erase_other_files() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"x").await.unwrap();
        ctx.state
            .collections
            .update_raw(Collection::Files, |doc| {
                doc["carol_at_x.com_legacy.txt"] =
                    json!({"owner": "carol@x.com", "original_name": "legacy.txt"});
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(files.list("alice@x.com", "/").await.unwrap().len(), 1);
        files.upload("bob@x.com", "b.txt", "/", b"y").await.unwrap();

        let file = files.download("alice@x.com", "a.txt").await.unwrap();
        assert_eq!(file.content.as_slice(), b"x");
        let raw: Value = ctx.state.collections.read(Collection::Files).await;
        let keys: Vec<&String> = raw.as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            [
                "alice_at_x.com_a.txt",
                "bob_at_x.com_b.txt",
                "carol_at_x.com_legacy.txt"
            ]
        );
    }

    #[tokio::test]
    async fn failed_metadata_save_leaves_blobs_untouched() {
        let ctx = context_with_mirror();
        let files = FileRepository::new(&ctx.state);
        files.upload("alice@x.com", "a.txt", "/", b"v1").await.unwrap();

        // Loads now come from the mirror and every save fails.
        let path = ctx.state.config.paths.collection(Collection::Files);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(
            files.upload("alice@x.com", "a.txt", "/", b"v2").await,
            Err(CloudError::Storage(_))
        ));
        assert!(matches!(
            files.permanently_delete("alice@x.com", "a.txt").await,
            Err(CloudError::Storage(_))
        ));

        std::fs::remove_dir(&path).unwrap();
        let file = files.download("alice@x.com", "a.txt").await.unwrap();
        assert_eq!(file.content.as_slice(), b"v1");
        let blobs = std::fs::read_dir(ctx.state.config.paths.blobs_dir())
            .unwrap()
            .count();
        assert_eq!(blobs, 1);
    }

    #[tokio::test]
    async fn invalid_upload_is_rejected_without_side_effects() {
        let ctx = context();
        let files = FileRepository::new(&ctx.state);

        assert!(matches!(
            files.upload("alice@x.com", "../x", "/", b"x").await,
            Err(CloudError::Validation(_))
        ));
        assert_eq!(files.count_active("alice@x.com").await, 0);
    }
}
