// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed, serialized access to collections.
//!
//! Each collection has its own async mutex, and the backend adds a lock
//! shared with other processes on the same data directory. Every
//! read-modify-write of a collection runs under both, so concurrent writers
//! cannot lose each other's updates. Work that touches two collections takes
//! the locks in [`Collection`] order.
//!
//! Entries that do not match the expected schema are left out of the typed
//! view and written back unchanged, so a single bad record never costs the
//! rest of the collection.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::backend::{Collection, CollectionBackend};
use super::StorageError;
use crate::error::{CloudError, CloudResult};

pub struct Collections {
    backend: Arc<dyn CollectionBackend>,
    locks: [Mutex<()>; Collection::ALL.len()],
}

impl Collections {
    pub fn new(backend: Arc<dyn CollectionBackend>) -> Self {
        Self {
            backend,
            locks: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    fn mutex(&self, collection: Collection) -> &Mutex<()> {
        &self.locks[collection as usize]
    }

    /// Snapshot of a collection.
    pub async fn read<T>(&self, collection: Collection) -> T
    where
        T: DeserializeOwned + Default,
    {
        let _guard = self.mutex(collection).lock().await;
        match decode::<T>(collection, self.backend.load(collection)) {
            Ok(loaded) => loaded.doc,
            Err(e) => {
                tracing::warn!(
                    collection = collection.name(),
                    error = %e,
                    "collection does not match its schema, treating as empty"
                );
                T::default()
            }
        }
    }

    /// Read-modify-write a collection. Nothing is saved if `apply` fails.
    pub async fn update<T, R, F>(&self, collection: Collection, apply: F) -> CloudResult<R>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut T) -> CloudResult<R>,
    {
        self.update_then(collection, apply, Ok).await
    }

    /// Like [`Collections::update`], with `finish` run after the save
    /// succeeds and before the locks are released. If the save fails, the
    /// value returned by `apply` is dropped instead.
    pub async fn update_then<T, R, S, F, G>(
        &self,
        collection: Collection,
        apply: F,
        finish: G,
    ) -> CloudResult<S>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut T) -> CloudResult<R>,
        G: FnOnce(R) -> CloudResult<S>,
    {
        let _guard = self.mutex(collection).lock().await;
        let _lock = self.backend.lock(collection)?;

        let Loaded { mut doc, unreadable } = decode::<T>(collection, self.backend.load(collection))?;
        let out = apply(&mut doc)?;
        self.persist(collection, &doc, unreadable)?;
        finish(out)
    }

    /// Read-modify-write two collections under both locks.
    pub async fn update_pair<A, B, R, F>(
        &self,
        first: Collection,
        second: Collection,
        apply: F,
    ) -> CloudResult<R>
    where
        A: DeserializeOwned + Serialize,
        B: DeserializeOwned + Serialize,
        F: FnOnce(&mut A, &mut B) -> CloudResult<R>,
    {
        if first == second {
            return Err(CloudError::validation(
                "a paired update needs two distinct collections",
            ));
        }
        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        let _low = self.mutex(low).lock().await;
        let _high = self.mutex(high).lock().await;
        let _low_lock = self.backend.lock(low)?;
        let _high_lock = self.backend.lock(high)?;

        let mut a = decode::<A>(first, self.backend.load(first))?;
        let mut b = decode::<B>(second, self.backend.load(second))?;
        let out = apply(&mut a.doc, &mut b.doc)?;
        self.persist(first, &a.doc, a.unreadable)?;
        self.persist(second, &b.doc, b.unreadable)?;
        Ok(out)
    }

    /// Read-modify-write the untyped document (migrations).
    pub async fn update_raw<R, F>(&self, collection: Collection, apply: F) -> CloudResult<R>
    where
        F: FnOnce(&mut Value) -> CloudResult<R>,
    {
        let _guard = self.mutex(collection).lock().await;
        let _lock = self.backend.lock(collection)?;

        let mut doc = self.backend.load(collection);
        let out = apply(&mut doc)?;
        self.backend.save(collection, &doc)?;
        Ok(out)
    }

    /// Append one entry to a log collection.
    pub async fn append<T: Serialize>(&self, collection: Collection, entry: &T) -> CloudResult<()> {
        let entry = serde_json::to_value(entry).map_err(StorageError::from)?;
        self.update_raw(collection, |doc| {
            match doc {
                Value::Array(entries) => entries.push(entry),
                other => *other = Value::Array(vec![entry]),
            }
            Ok(())
        })
        .await
    }

    fn persist<T: Serialize>(
        &self,
        collection: Collection,
        doc: &T,
        unreadable: Option<Value>,
    ) -> CloudResult<()> {
        let mut value = serde_json::to_value(doc).map_err(StorageError::from)?;
        match (&mut value, unreadable) {
            (Value::Object(entries), Some(Value::Object(kept))) => {
                for (key, entry) in kept {
                    entries.entry(key).or_insert(entry);
                }
            }
            (Value::Array(entries), Some(Value::Array(kept))) => entries.extend(kept),
            _ => {}
        }
        self.backend.save(collection, &value)?;
        Ok(())
    }
}

/// Typed view of a collection plus the raw entries left out of it.
struct Loaded<T> {
    doc: T,
    unreadable: Option<Value>,
}

fn decode<T: DeserializeOwned>(collection: Collection, value: Value) -> CloudResult<Loaded<T>> {
    match T::deserialize(&value) {
        Ok(doc) => {
            return Ok(Loaded {
                doc,
                unreadable: None,
            })
        }
        Err(e) => tracing::warn!(
            collection = collection.name(),
            error = %e,
            "collection has entries that do not match the schema, setting them aside"
        ),
    }

    let (readable, unreadable) = split_entries::<T>(value);
    let doc = T::deserialize(&readable).map_err(StorageError::from)?;
    Ok(Loaded {
        doc,
        unreadable: Some(unreadable),
    })
}

/// Partition a mapping or list into entries that decode as part of `T` on
/// their own and entries that do not.
fn split_entries<T: DeserializeOwned>(value: Value) -> (Value, Value) {
    match value {
        Value::Object(entries) => {
            let mut readable = Map::new();
            let mut unreadable = Map::new();
            for (key, entry) in entries {
                let mut single = Map::new();
                single.insert(key.clone(), entry.clone());
                if T::deserialize(&Value::Object(single)).is_ok() {
                    readable.insert(key, entry);
                } else {
                    tracing::warn!(key = %key, "skipping unreadable entry");
                    unreadable.insert(key, entry);
                }
            }
            (Value::Object(readable), Value::Object(unreadable))
        }
        Value::Array(items) => {
            let (readable, unreadable): (Vec<Value>, Vec<Value>) = items
                .into_iter()
                .partition(|item| T::deserialize(&Value::Array(vec![item.clone()])).is_ok());
            (Value::Array(readable), Value::Array(unreadable))
        }
        other => (other, Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileBackend, LocalStorage, StoragePaths};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn open(root: &std::path::Path) -> Arc<Collections> {
        let mut storage = LocalStorage::new(StoragePaths::new(root));
        storage.initialize().unwrap();
        Arc::new(Collections::new(Arc::new(JsonFileBackend::new(storage))))
    }

    fn setup() -> (TempDir, Arc<Collections>) {
        let temp = TempDir::new().unwrap();
        let collections = open(temp.path());
        (temp, collections)
    }

    #[tokio::test]
    async fn update_persists_changes() {
        let (_temp, collections) = setup();

        collections
            .update(Collection::Otp, |doc: &mut BTreeMap<String, u32>| {
                doc.insert("a".into(), 1);
                Ok(())
            })
            .await
            .unwrap();

        let doc: BTreeMap<String, u32> = collections.read(Collection::Otp).await;
        assert_eq!(doc.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn failed_update_saves_nothing() {
        let (_temp, collections) = setup();

        let result = collections
            .update(Collection::Otp, |doc: &mut BTreeMap<String, u32>| {
                doc.insert("a".into(), 1);
                Err::<(), _>(CloudError::conflict("nope"))
            })
            .await;

        assert!(matches!(result, Err(CloudError::Conflict(_))));
        let doc: BTreeMap<String, u32> = collections.read(Collection::Otp).await;
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let (_temp, collections) = setup();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let collections = collections.clone();
            tasks.push(tokio::spawn(async move {
                collections
                    .update(Collection::Otp, |doc: &mut BTreeMap<String, u32>| {
                        doc.insert(format!("k{i}"), i);
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let doc: BTreeMap<String, u32> = collections.read(Collection::Otp).await;
        assert_eq!(doc.len(), 16);
    }

    #[tokio::test]
    async fn append_grows_log() {
        let (_temp, collections) = setup();

        collections
            .append(Collection::AccessLog, &serde_json::json!({"n": 1}))
            .await
            .unwrap();
        collections
            .append(Collection::AccessLog, &serde_json::json!({"n": 2}))
            .await
            .unwrap();

        let log: Vec<Value> = collections.read(Collection::AccessLog).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1]["n"], 2);
    }

    #[tokio::test]
    async fn unreadable_entries_survive_updates() {
        let (temp, collections) = setup();
        let path = StoragePaths::new(temp.path()).collection(Collection::Otp);
        std::fs::write(&path, r#"{"a": 1, "legacy": {"otp": "123"}}"#).unwrap();

        let doc: BTreeMap<String, u32> = collections.read(Collection::Otp).await;
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get("a"), Some(&1));

        collections
            .update(Collection::Otp, |doc: &mut BTreeMap<String, u32>| {
                doc.insert("b".into(), 2);
                Ok(())
            })
            .await
            .unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["a"], 1);
        assert_eq!(raw["b"], 2);
        assert_eq!(raw["legacy"]["otp"], "123");
    }

    #[tokio::test]
    async fn unreadable_log_items_are_kept() {
        let (temp, collections) = setup();
        let path = StoragePaths::new(temp.path()).collection(Collection::ActivityLog);
        std::fs::write(&path, r#"[1, "two", 3]"#).unwrap();

        let log: Vec<u32> = collections.read(Collection::ActivityLog).await;
        assert_eq!(log, vec![1, 3]);

        collections
            .update(Collection::ActivityLog, |log: &mut Vec<u32>| {
                log.push(4);
                Ok(())
            })
            .await
            .unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!([1, 3, 4, "two"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_handles_on_one_directory_do_not_lose_updates() {
        let temp = TempDir::new().unwrap();
        let handles = [open(temp.path()), open(temp.path())];

        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let collections = handles[i as usize % 2].clone();
            tasks.push(tokio::spawn(async move {
                collections
                    .update(Collection::Otp, |doc: &mut BTreeMap<String, u32>| {
                        doc.insert(format!("k{i}"), i);
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let doc: BTreeMap<String, u32> = handles[0].read(Collection::Otp).await;
        assert_eq!(doc.len(), 32);
        assert!(StoragePaths::new(temp.path())
            .collection_lock(Collection::Otp)
            .exists());
    }

    #[tokio::test]
    async fn finish_runs_only_after_save() {
        let (temp, collections) = setup();
        let path = StoragePaths::new(temp.path()).collection(Collection::Otp);
        std::fs::create_dir_all(&path).unwrap();

        let mut finished = false;
        let result = collections
            .update_then(
                Collection::Otp,
                |doc: &mut BTreeMap<String, u32>| {
                    doc.insert("a".into(), 1);
                    Ok(())
                },
                |()| {
                    finished = true;
                    Ok(())
                },
            )
            .await;

        assert!(matches!(result, Err(CloudError::Storage(_))));
        assert!(!finished);
    }

    #[tokio::test]
    async fn pair_update_rejects_same_collection() {
        let (_temp, collections) = setup();
        let result = collections
            .update_pair(
                Collection::Files,
                Collection::Files,
                |_: &mut Value, _: &mut Value| Ok(()),
            )
            .await;
        assert!(matches!(result, Err(CloudError::Validation(_))));
    }
}
