// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Periodic maintenance: purge expired trash and scan for unusually
//! active users. Meant to run from cron or a systemd timer.

use std::process::ExitCode;
use std::sync::Arc;

use securecloud_core::clock::SystemClock;
use securecloud_core::logging::init_tracing;
use securecloud_core::notify::LogSink;
use securecloud_core::{AppState, CloudResult, CloudService, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "maintenance failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> CloudResult<()> {
    tracing::info!(root = %config.paths.root().display(), "starting maintenance");

    let (state, migrations) =
        AppState::initialize(config, Arc::new(SystemClock), Arc::new(LogSink)).await?;
    if migrations.folders_migrated > 0 || migrations.files_migrated > 0 {
        tracing::info!(
            folders = migrations.folders_migrated,
            files = migrations.files_migrated,
            "migrated legacy records"
        );
    }

    let service = CloudService::new(state);

    let purged = service.cleanup_trash().await?;
    tracing::info!(purged, "trash cleanup finished");

    let flagged = service.scan_dashboard().await?;
    for message in &flagged {
        tracing::warn!(%message, "high activity");
    }
    tracing::info!(flagged = flagged.len(), "activity scan finished");

    Ok(())
}
