// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File, trash and folder operations.

use super::CloudService;
use crate::error::{CloudError, CloudResult};
use crate::models::{BulkDownload, BulkUploadReport, UploadFailure, UploadItem};
use crate::monitor::{analyze_recent, bulk_detail, ActivityAction, ActivityLog, AlertDispatcher, AnomalyAlert};
use crate::storage::repository::files::{
    normalize_folder, DecryptedFile, FileRepository, FileSearch, StoredFile,
};
use crate::storage::repository::folders::{Folder, FolderRepository};
use crate::storage::ScratchFile;

pub const MAX_BULK_UPLOAD_FILES: usize = 20;
pub const MAX_BULK_UPLOAD_BYTES: usize = 200 * 1024 * 1024;
pub const MAX_BULK_DOWNLOAD_FILES: usize = 50;

impl CloudService {
    pub async fn upload(
        &self,
        owner: &str,
        name: &str,
        folder: &str,
        content: &[u8],
    ) -> CloudResult<StoredFile> {
        let stored = FileRepository::new(&self.state)
            .upload(owner, name, folder, content)
            .await?;
        let name = stored.record.original_name.as_str();
        self.track(owner, ActivityAction::Upload, Some(name)).await;
        self.audit_now(owner, "upload", name).await;
        Ok(stored)
    }

    /// Upload several files into one folder. Each file succeeds or fails on
    /// its own; limits apply to the batch as a whole.
    pub async fn upload_many(
        &self,
        owner: &str,
        folder: &str,
        items: Vec<UploadItem>,
    ) -> CloudResult<BulkUploadReport> {
        if items.is_empty() {
            return Err(CloudError::validation("no files provided"));
        }
        if items.len() > MAX_BULK_UPLOAD_FILES {
            return Err(CloudError::validation(format!(
                "at most {MAX_BULK_UPLOAD_FILES} files can be uploaded at once"
            )));
        }
        let total: usize = items.iter().map(|i| i.content.len()).sum();
        if total > MAX_BULK_UPLOAD_BYTES {
            return Err(CloudError::validation(format!(
                "total upload size exceeds {} MiB",
                MAX_BULK_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        let folder = normalize_folder(folder)?;

        let mut report = BulkUploadReport::default();
        for item in items {
            match self.upload(owner, &item.name, &folder, &item.content).await {
                Ok(stored) => report.uploaded.push(stored),
                Err(e) => {
                    tracing::warn!(file = %item.name, error = %e, "bulk upload item failed");
                    report.failed.push(UploadFailure {
                        name: item.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.uploaded.is_empty() {
            let detail = bulk_detail(report.uploaded.len());
            self.track(owner, ActivityAction::BulkUpload, Some(&detail))
                .await;
        }
        Ok(report)
    }

    pub async fn list_files(&self, owner: &str, folder: &str) -> CloudResult<Vec<StoredFile>> {
        FileRepository::new(&self.state).list(owner, folder).await
    }

    pub async fn download(&self, owner: &str, name: &str) -> CloudResult<DecryptedFile> {
        let file = FileRepository::new(&self.state).download(owner, name).await?;
        self.record_download(owner, &file.original_name).await;
        Ok(file)
    }

    /// Download into a scratch file that is removed when the guard drops.
    pub async fn download_to_scratch(&self, owner: &str, name: &str) -> CloudResult<ScratchFile> {
        let file = self.download(owner, name).await?;
        Ok(self
            .state
            .scratch
            .materialize(&file.original_name, &file.content)?)
    }

    /// Decrypt several files. Fails without side effects if any name does
    /// not resolve to an active file of the owner.
    pub async fn download_many(&self, owner: &str, names: &[String]) -> CloudResult<BulkDownload> {
        if names.is_empty() {
            return Err(CloudError::validation("no files requested"));
        }
        if names.len() > MAX_BULK_DOWNLOAD_FILES {
            return Err(CloudError::validation(format!(
                "at most {MAX_BULK_DOWNLOAD_FILES} files can be downloaded at once"
            )));
        }

        let files = FileRepository::new(&self.state);
        let mut decrypted = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match files.download(owner, name).await {
                Ok(file) => decrypted.push(file),
                Err(CloudError::NotFound(_)) => missing.push(name.as_str()),
                Err(e) => return Err(e),
            }
        }
        if !missing.is_empty() {
            return Err(CloudError::not_found(format!(
                "files {}",
                missing.join(", ")
            )));
        }

        for file in &decrypted {
            self.record_download(owner, &file.original_name).await;
        }
        let detail = bulk_detail(decrypted.len());
        self.track(owner, ActivityAction::BulkDownload, Some(&detail))
            .await;
        Ok(BulkDownload { files: decrypted })
    }

    async fn record_download(&self, owner: &str, name: &str) {
        self.track(owner, ActivityAction::Download, Some(name)).await;
        self.audit_now(owner, "download", name).await;
    }

    /// Move a file to the trash, then check for a burst of deletions.
    pub async fn delete(&self, owner: &str, name: &str) -> CloudResult<bool> {
        let trashed = FileRepository::new(&self.state).delete(owner, name).await?;
        if !trashed {
            return Ok(false);
        }
        self.track(owner, ActivityAction::Delete, Some(name)).await;
        self.audit_now(owner, "delete", name).await;
        self.check_deletions(owner).await;
        Ok(true)
    }

    async fn check_deletions(&self, owner: &str) {
        let entries = ActivityLog::new(&self.state).entries().await;
        let recent = analyze_recent(
            &entries,
            Some(owner),
            self.state.config.anomaly_window,
            self.state.clock.now(),
        );
        if let Some(alert @ AnomalyAlert::UnusualDeletions { .. }) = recent.alert {
            if let Err(e) = AlertDispatcher::new(&self.state)
                .dispatch_daily(owner, alert)
                .await
            {
                tracing::warn!(error = %e, "deletion alert could not be recorded");
            }
        }
    }

    pub async fn list_trash(&self, owner: &str) -> Vec<StoredFile> {
        FileRepository::new(&self.state).list_trash(owner).await
    }

    pub async fn restore(&self, owner: &str, name: &str) -> CloudResult<bool> {
        let restored = FileRepository::new(&self.state).restore(owner, name).await?;
        if restored {
            self.audit_now(owner, "restore", name).await;
        }
        Ok(restored)
    }

    pub async fn permanently_delete(&self, owner: &str, name: &str) -> CloudResult<bool> {
        let removed = FileRepository::new(&self.state)
            .permanently_delete(owner, name)
            .await?;
        if removed {
            self.audit_now(owner, "permanent_delete", name).await;
        }
        Ok(removed)
    }

    pub async fn empty_trash(&self, owner: &str) -> CloudResult<usize> {
        let removed = FileRepository::new(&self.state).empty_trash(owner).await?;
        if removed > 0 {
            self.audit_now(owner, "empty_trash", &format!("{removed} files"))
                .await;
        }
        Ok(removed)
    }

    /// Purge trash older than the configured retention.
    pub async fn cleanup_trash(&self) -> CloudResult<usize> {
        FileRepository::new(&self.state)
            .cleanup_trash(self.state.config.trash_retention_days)
            .await
    }

    pub async fn move_file(&self, owner: &str, name: &str, folder: &str) -> CloudResult<StoredFile> {
        let moved = FileRepository::new(&self.state)
            .move_file(owner, name, folder)
            .await?;
        self.audit(
            crate::storage::AccessLogEntry::new(owner, "move", self.state.clock.now())
                .with_file(moved.record.original_name.clone())
                .with_meta("folder", moved.record.folder.clone().into()),
        )
        .await;
        Ok(moved)
    }

    pub async fn search_files(&self, owner: &str, search: &FileSearch) -> CloudResult<Vec<StoredFile>> {
        FileRepository::new(&self.state).search(owner, search).await
    }

    pub async fn create_folder(&self, owner: &str, name: &str, parent: &str) -> CloudResult<Folder> {
        FolderRepository::new(&self.state)
            .create(owner, name, parent)
            .await
    }

    pub async fn list_folders(&self, owner: &str) -> Vec<Folder> {
        FolderRepository::new(&self.state).list(owner).await
    }

    pub async fn rename_folder(&self, owner: &str, id: &str, new_name: &str) -> CloudResult<Folder> {
        FolderRepository::new(&self.state)
            .rename(owner, id, new_name)
            .await
    }

    pub async fn delete_folder(&self, owner: &str, id: &str) -> CloudResult<()> {
        FolderRepository::new(&self.state).delete(owner, id).await
    }
}
