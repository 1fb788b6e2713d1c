// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time upgrades of older on-disk document shapes.
//!
//! Runs at startup, before any request is served. Each step is idempotent
//! and writes a backup of the collection before changing it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::repository::files::ROOT_FOLDER;
use super::repository::folders::{child_path, folder_id, Folder};
use super::{Collection, Collections, LocalStorage};
use crate::error::CloudResult;

/// Shapes found in the `folders` collection.
///
/// Early releases stored a plain list of top-level folder names per user:
/// `{"alice@x.com": ["docs", "photos"]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FolderEntry {
    Canonical(Folder),
    Legacy(Vec<String>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub folders_migrated: usize,
    pub files_migrated: usize,
}

/// Rewrite legacy folder lists into canonical folder entries.
pub fn migrate_folders(doc: &mut Value, now: DateTime<Utc>) -> usize {
    let Some(entries) = doc.as_object_mut() else {
        return 0;
    };

    let mut migrated = 0;
    let mut canonical = Map::new();
    for (key, value) in std::mem::take(entries) {
        match serde_json::from_value::<FolderEntry>(value.clone()) {
            Ok(FolderEntry::Canonical(_)) => {
                canonical.insert(key, value);
            }
            Ok(FolderEntry::Legacy(names)) => {
                for name in names {
                    let name = name.trim();
                    if name.is_empty() || name.contains('/') {
                        tracing::warn!(owner = %key, folder = %name, "skipping unusable legacy folder name");
                        continue;
                    }
                    let path = child_path(ROOT_FOLDER, name);
                    let id = folder_id(&key, &path);
                    if canonical.contains_key(&id) {
                        continue;
                    }
                    let folder = Folder {
                        id: id.clone(),
                        name: name.to_string(),
                        path,
                        parent: ROOT_FOLDER.to_string(),
                        owner: key.clone(),
                        created_at: now,
                    };
                    if let Ok(value) = serde_json::to_value(&folder) {
                        canonical.insert(id, value);
                        migrated += 1;
                    }
                }
            }
            Err(_) => {
                tracing::warn!(key = %key, "unrecognized folder entry left untouched");
                canonical.insert(key, value);
            }
        }
    }
    *entries = canonical;
    migrated
}

/// Give every file record a folder; records predating folders live in `/`.
pub fn migrate_file_records(doc: &mut Value) -> usize {
    let Some(records) = doc.as_object_mut() else {
        return 0;
    };
    let mut migrated = 0;
    for record in records.values_mut() {
        if let Some(fields) = record.as_object_mut() {
            let missing = fields
                .get("folder")
                .and_then(Value::as_str)
                .is_none_or(|f| f.trim().is_empty());
            if missing {
                fields.insert("folder".into(), Value::String(ROOT_FOLDER.into()));
                migrated += 1;
            }
        }
    }
    migrated
}

fn needs_folder_migration(doc: &Value) -> bool {
    doc.as_object()
        .is_some_and(|entries| entries.values().any(Value::is_array))
}

fn needs_file_migration(doc: &Value) -> bool {
    doc.as_object().is_some_and(|records| {
        records.values().any(|r| {
            r.get("folder")
                .and_then(Value::as_str)
                .is_none_or(|f| f.trim().is_empty())
        })
    })
}

/// Apply all pending migrations.
pub async fn run_startup_migrations(
    collections: &Collections,
    storage: &LocalStorage,
    now: DateTime<Utc>,
) -> CloudResult<MigrationReport> {
    let tag = format!("premigration-{}", now.format("%Y%m%dT%H%M%S"));

    let folders_migrated = collections
        .update_raw(Collection::Folders, |doc| {
            if !needs_folder_migration(doc) {
                return Ok(0);
            }
            storage.write_json(storage.paths().collection_backup(Collection::Folders, &tag), doc)?;
            Ok(migrate_folders(doc, now))
        })
        .await?;

    let files_migrated = collections
        .update_raw(Collection::Files, |doc| {
            if !needs_file_migration(doc) {
                return Ok(0);
            }
            storage.write_json(storage.paths().collection_backup(Collection::Files, &tag), doc)?;
            Ok(migrate_file_records(doc))
        })
        .await?;

    let report = MigrationReport {
        folders_migrated,
        files_migrated,
    };
    if folders_migrated + files_migrated > 0 {
        tracing::info!(folders_migrated, files_migrated, "storage migrations applied");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::folders::FolderIndex;
    use crate::storage::{JsonFileBackend, StoragePaths};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn legacy_folder_lists_become_folders() {
        let now = Utc::now();
        let mut doc = json!({
            "alice@x.com": ["docs", "photos", "bad/name"],
            "bob@x.com:/work": {
                "id": "bob@x.com:/work",
                "name": "work",
                "path": "/work",
                "parent": "/",
                "owner": "bob@x.com",
                "created_at": "2024-01-01T00:00:00Z"
            }
        });

        assert_eq!(migrate_folders(&mut doc, now), 2);

        let folders: FolderIndex = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(folders.len(), 3);
        let docs = &folders["alice@x.com:/docs"];
        assert_eq!(docs.path, "/docs");
        assert_eq!(docs.parent, "/");
        assert_eq!(docs.owner, "alice@x.com");
        assert!(folders.contains_key("bob@x.com:/work"));

        assert_eq!(migrate_folders(&mut doc, now), 0);
    }

    #[test]
    fn file_records_get_root_folder() {
        let mut doc = json!({
            "a_at_x.com_a.txt": {"owner": "a@x.com", "original_name": "a.txt", "uploaded_at": "2024-01-01T00:00:00"},
            "a_at_x.com_b.txt": {"owner": "a@x.com", "original_name": "b.txt", "uploaded_at": "2024-01-01T00:00:00", "folder": "/docs"}
        });

        assert!(needs_file_migration(&doc));
        assert_eq!(migrate_file_records(&mut doc), 1);
        assert_eq!(doc["a_at_x.com_a.txt"]["folder"], "/");
        assert_eq!(doc["a_at_x.com_b.txt"]["folder"], "/docs");
        assert!(!needs_file_migration(&doc));
    }

    #[tokio::test]
    async fn startup_migration_writes_backup() {
        let temp = TempDir::new().unwrap();
        let mut storage = LocalStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        storage
            .write_json(
                storage.paths().collection(Collection::Folders),
                &json!({"alice@x.com": ["docs"]}),
            )
            .unwrap();
        let collections = Collections::new(Arc::new(JsonFileBackend::new(storage.clone())));

        let report = run_startup_migrations(&collections, &storage, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.folders_migrated, 1);
        assert_eq!(report.files_migrated, 0);

        let backups = storage.list_files(storage.paths().backups_dir()).unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("folders.premigration-"));

        let again = run_startup_migrations(&collections, &storage, Utc::now())
            .await
            .unwrap();
        assert_eq!(again, MigrationReport::default());
    }
}
