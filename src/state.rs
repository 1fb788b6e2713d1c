// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::crypto::{
    Argon2Credentials, CredentialService, FileCipher, JwtTokenService, TokenService,
};
use crate::error::CloudResult;
use crate::notify::NotificationSink;
use crate::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
use crate::storage::migration::{run_startup_migrations, MigrationReport};
use crate::storage::{
    BlobStore, Collections, JsonFileBackend, LocalStorage, MirroredBackend, RedbMirror,
    ScratchSpace, STALE_SCRATCH_AGE,
};

/// Process-wide handles shared by every request. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: LocalStorage,
    pub collections: Arc<Collections>,
    pub blobs: BlobStore,
    pub scratch: ScratchSpace,
    pub cipher: Arc<FileCipher>,
    pub credentials: Arc<dyn CredentialService>,
    pub tokens: Arc<dyn TokenService>,
    pub notifier: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub search_limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    /// Open storage, load the encryption key and apply pending migrations.
    ///
    /// Fails fast on an unreadable key or data directory; nothing should be
    /// served without them.
    pub async fn initialize(
        config: Config,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> CloudResult<(Self, MigrationReport)> {
        let state = Self::open(config, clock, notifier)?;
        let report =
            run_startup_migrations(&state.collections, &state.storage, state.clock.now()).await?;
        Ok((state, report))
    }

    /// Everything [`AppState::initialize`] does except migrations.
    pub fn open(
        config: Config,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> CloudResult<Self> {
        let mut storage = LocalStorage::new(config.paths.clone());
        storage.initialize()?;
        storage.health_check()?;

        let mirror = match &config.mirror_db_path {
            Some(path) => Some(RedbMirror::open(path).map_err(crate::storage::StorageError::from)?),
            None => None,
        };
        let backend = MirroredBackend::new(JsonFileBackend::new(storage.clone()), mirror);

        let cipher = FileCipher::load_or_generate(&config.key_file)?;

        let scratch = ScratchSpace::new(config.paths.scratch_dir());
        let purged = scratch.purge_stale(STALE_SCRATCH_AGE)?;
        if purged > 0 {
            tracing::info!(purged, "removed stale scratch files");
        }

        let search_limiter = SlidingWindowLimiter::new(
            RateLimitConfig {
                max_requests: config.search_rate_limit_max,
                window: config.search_rate_limit_window,
            },
            clock.clone(),
        );
        let tokens = JwtTokenService::new(&config.jwt_secret, clock.clone());

        tracing::info!(
            data_dir = %config.paths.root().display(),
            mirror = backend.has_mirror(),
            "storage ready"
        );

        Ok(Self {
            storage: storage.clone(),
            collections: Arc::new(Collections::new(Arc::new(backend))),
            blobs: BlobStore::new(storage),
            scratch,
            cipher: Arc::new(cipher),
            credentials: Arc::new(Argon2Credentials::default()),
            tokens: Arc::new(tokens),
            notifier,
            clock,
            search_limiter: Arc::new(search_limiter),
            config: Arc::new(config),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::notify::LogSink;
    use crate::storage::Collection;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn initialize_creates_layout_and_key() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_root(dir.path());
        let key_file = config.key_file.clone();

        let (state, report) =
            AppState::initialize(config, Arc::new(SystemClock), Arc::new(LogSink))
                .await
                .unwrap();

        assert!(key_file.exists());
        assert!(state.config.paths.blobs_dir().is_dir());
        assert_eq!(report, MigrationReport::default());
    }

    #[tokio::test]
    async fn initialize_migrates_legacy_folders() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_root(dir.path());
        std::fs::create_dir_all(config.paths.db_dir()).unwrap();
        std::fs::write(
            config.paths.collection(Collection::Folders),
            json!({"alice@x.com": ["docs"]}).to_string(),
        )
        .unwrap();

        let (_state, report) =
            AppState::initialize(config, Arc::new(SystemClock), Arc::new(LogSink))
                .await
                .unwrap();
        assert_eq!(report.folders_migrated, 1);
    }

    #[tokio::test]
    async fn malformed_key_fails_fast() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_root(dir.path());
        std::fs::create_dir_all(config.paths.db_dir()).unwrap();
        std::fs::write(&config.key_file, "not hex").unwrap();

        let result = AppState::initialize(config, Arc::new(SystemClock), Arc::new(LogSink)).await;
        assert!(matches!(result, Err(crate::error::CloudError::KeyMaterial)));
    }

    #[tokio::test]
    async fn mirror_is_opened_when_configured() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_root(dir.path().join("data"));
        config.mirror_db_path = Some(dir.path().join("mirror.redb"));

        let (state, _) = AppState::initialize(config, Arc::new(SystemClock), Arc::new(LogSink))
            .await
            .unwrap();
        state
            .collections
            .append(Collection::ActivityLog, &json!({"user": "a"}))
            .await
            .unwrap();
        assert!(dir.path().join("mirror.redb").exists());
    }
}
