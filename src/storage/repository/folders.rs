// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Folder hierarchy per user.
//!
//! Folders are keyed `owner:path`. Files reference folders by path only,
//! so renaming a folder rewrites the paths of every descendant folder and
//! every file underneath it in the same locked update.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::files::{is_within, normalize_folder, FileIndex, ROOT_FOLDER};
use crate::error::{CloudError, CloudResult};
use crate::state::AppState;
use crate::storage::{Collection, OwnedResource, OwnershipCheck};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub path: String,
    pub parent: String,
    pub owner: String,
    #[serde(with = "crate::clock::utc")]
    pub created_at: DateTime<Utc>,
}

impl OwnedResource for Folder {
    fn owner(&self) -> &str {
        &self.owner
    }
}

/// The `folders` collection.
pub type FolderIndex = BTreeMap<String, Folder>;

pub fn folder_id(owner: &str, path: &str) -> String {
    format!("{owner}:{path}")
}

/// Path of a child folder under `parent`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_FOLDER {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn validate_folder_name(name: &str) -> CloudResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CloudError::validation("folder name is required"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', ':', '\0']) {
        return Err(CloudError::validation(format!("invalid folder name: {name}")));
    }
    Ok(name)
}

fn replace_prefix(path: &str, old: &str, new: &str) -> String {
    format!("{new}{}", &path[old.len()..])
}

pub struct FolderRepository<'a> {
    state: &'a AppState,
}

impl<'a> FolderRepository<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn create(&self, owner: &str, name: &str, parent: &str) -> CloudResult<Folder> {
        let name = validate_folder_name(name)?.to_string();
        let parent = normalize_folder(parent)?;
        let path = child_path(&parent, &name);
        let id = folder_id(owner, &path);
        let now = self.state.clock.now();

        self.state
            .collections
            .update(Collection::Folders, |folders: &mut FolderIndex| {
                if parent != ROOT_FOLDER && !folders.contains_key(&folder_id(owner, &parent)) {
                    return Err(CloudError::not_found("parent folder"));
                }
                if folders.contains_key(&id) {
                    return Err(CloudError::conflict(format!("folder {path} already exists")));
                }
                let folder = Folder {
                    id: id.clone(),
                    name,
                    path: path.clone(),
                    parent,
                    owner: owner.to_string(),
                    created_at: now,
                };
                folders.insert(id.clone(), folder.clone());
                Ok(folder)
            })
            .await
    }

    /// The owner's folders ordered by path.
    pub async fn list(&self, owner: &str) -> Vec<Folder> {
        let folders: FolderIndex = self.state.collections.read(Collection::Folders).await;
        let mut owned: Vec<Folder> = folders
            .into_values()
            .filter(|f| f.owner == owner)
            .collect();
        owned.sort_by(|a, b| a.path.cmp(&b.path));
        owned
    }

    /// Rename a folder and cascade the new path to descendants and files.
    pub async fn rename(&self, owner: &str, id: &str, new_name: &str) -> CloudResult<Folder> {
        let new_name = validate_folder_name(new_name)?.to_string();

        self.state
            .collections
            .update_pair(
                Collection::Files,
                Collection::Folders,
                |files: &mut FileIndex, folders: &mut FolderIndex| {
                    let target = folders.get(id).owned_by(owner, "folder")?.clone();
                    let old_path = target.path.clone();
                    let new_path = child_path(&target.parent, &new_name);
                    if new_path == old_path {
                        return Ok(target);
                    }
                    let new_id = folder_id(owner, &new_path);
                    if folders.contains_key(&new_id) {
                        return Err(CloudError::conflict(format!(
                            "folder {new_path} already exists"
                        )));
                    }

                    let descendants: Vec<String> = folders
                        .iter()
                        .filter(|(_, f)| {
                            f.owner == owner && f.path != old_path && is_within(&f.path, &old_path)
                        })
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in descendants {
                        if let Some(mut folder) = folders.remove(&key) {
                            folder.path = replace_prefix(&folder.path, &old_path, &new_path);
                            folder.parent = replace_prefix(&folder.parent, &old_path, &new_path);
                            folder.id = folder_id(owner, &folder.path);
                            folders.insert(folder.id.clone(), folder);
                        }
                    }

                    folders.remove(id);
                    let renamed = Folder {
                        id: new_id.clone(),
                        name: new_name.clone(),
                        path: new_path.clone(),
                        ..target
                    };
                    folders.insert(new_id, renamed.clone());

                    let mut moved_files = 0;
                    for record in files.values_mut() {
                        if record.owner == owner && is_within(&record.folder, &old_path) {
                            record.folder = replace_prefix(&record.folder, &old_path, &new_path);
                            moved_files += 1;
                        }
                    }
                    tracing::info!(from = %old_path, to = %new_path, moved_files, "folder renamed");
                    Ok(renamed)
                },
            )
            .await
    }

    /// Delete an empty folder.
    pub async fn delete(&self, owner: &str, id: &str) -> CloudResult<()> {
        self.state
            .collections
            .update_pair(
                Collection::Files,
                Collection::Folders,
                |files: &mut FileIndex, folders: &mut FolderIndex| {
                    let path = folders.get(id).owned_by(owner, "folder")?.path.clone();

                    if files
                        .values()
                        .any(|r| r.owner == owner && !r.is_trashed() && r.folder == path)
                    {
                        return Err(CloudError::conflict(format!(
                            "folder {path} still contains files"
                        )));
                    }
                    if folders
                        .values()
                        .any(|f| f.owner == owner && f.parent == path)
                    {
                        return Err(CloudError::conflict(format!(
                            "folder {path} still contains folders"
                        )));
                    }

                    folders.remove(id);
                    Ok(())
                },
            )
            .await
    }
}
