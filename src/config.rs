// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup into
//! [`Config`]. Unset or blank variables fall back to their defaults;
//! malformed numbers are rejected.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for collections, blobs and scratch files | `/data` |
//! | `ENCRYPTION_KEY_FILE` | File encryption key (hex) | `$DATA_DIR/db/secret.key` |
//! | `MIRROR_DB_PATH` | redb mirror of all collections | unset (disabled) |
//! | `JWT_SECRET` | HS256 secret for session tokens | random per process |
//! | `SHARE_BASE_URL` | Public base URL used in share links | `http://localhost:5000` |
//! | `TRASH_RETENTION_DAYS` | Age at which trashed files are purged | `30` |
//! | `ANOMALY_WINDOW_HOURS` | Look-back window of the anomaly rules | `24` |
//! | `OTP_EXPIRY` | One-time code lifetime in seconds | `180` |
//! | `SEARCH_RATE_LIMIT_MAX` | Log searches allowed per window | `30` |
//! | `SEARCH_RATE_LIMIT_WINDOW` | Rate limit window in seconds | `60` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use rand::RngCore;
use thiserror::Error;

use crate::storage::paths::DATA_ROOT;
use crate::storage::StoragePaths;

/// Environment variable name for the data directory.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the encryption key file.
///
/// Losing this file makes every stored blob unreadable.
pub const ENCRYPTION_KEY_FILE_ENV: &str = "ENCRYPTION_KEY_FILE";

/// Environment variable name for the optional redb mirror.
pub const MIRROR_DB_PATH_ENV: &str = "MIRROR_DB_PATH";

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

pub const SHARE_BASE_URL_ENV: &str = "SHARE_BASE_URL";
pub const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:5000";

pub const TRASH_RETENTION_DAYS_ENV: &str = "TRASH_RETENTION_DAYS";
pub const DEFAULT_TRASH_RETENTION_DAYS: i64 = 30;

pub const ANOMALY_WINDOW_HOURS_ENV: &str = "ANOMALY_WINDOW_HOURS";
pub const DEFAULT_ANOMALY_WINDOW_HOURS: i64 = 24;

pub const OTP_EXPIRY_ENV: &str = "OTP_EXPIRY";
pub const DEFAULT_OTP_EXPIRY_SECS: i64 = 180;

pub const SEARCH_RATE_LIMIT_MAX_ENV: &str = "SEARCH_RATE_LIMIT_MAX";
pub const DEFAULT_SEARCH_RATE_LIMIT_MAX: usize = 30;

pub const SEARCH_RATE_LIMIT_WINDOW_ENV: &str = "SEARCH_RATE_LIMIT_WINDOW";
pub const DEFAULT_SEARCH_RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Environment variable name for the log output format.
///
/// # Values
/// - `json`: one JSON object per line
/// - `pretty`: human-readable (default)
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                expected: "`json` or `pretty`",
                value: raw.to_string(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub paths: StoragePaths,
    pub key_file: PathBuf,
    pub mirror_db_path: Option<PathBuf>,
    pub jwt_secret: Vec<u8>,
    pub share_base_url: String,
    pub trash_retention_days: i64,
    pub anomaly_window: Duration,
    pub otp_expiry: Duration,
    pub search_rate_limit_max: usize,
    pub search_rate_limit_window: Duration,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.paths.root())
            .field("key_file", &self.key_file)
            .field("mirror_db_path", &self.mirror_db_path)
            .field("jwt_secret", &"<redacted>")
            .field("share_base_url", &self.share_base_url)
            .field("trash_retention_days", &self.trash_retention_days)
            .field("anomaly_window", &self.anomaly_window)
            .field("otp_expiry", &self.otp_expiry)
            .field("search_rate_limit_max", &self.search_rate_limit_max)
            .field("search_rate_limit_window", &self.search_rate_limit_window)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let root = var(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string());
        let mut config = Self::for_root(root);

        if let Some(key_file) = var(ENCRYPTION_KEY_FILE_ENV) {
            config.key_file = PathBuf::from(key_file);
        }
        config.mirror_db_path = var(MIRROR_DB_PATH_ENV).map(PathBuf::from);
        match var(JWT_SECRET_ENV) {
            Some(secret) => config.jwt_secret = secret.into_bytes(),
            None => tracing::warn!(
                "{JWT_SECRET_ENV} not set; sessions will not survive a restart"
            ),
        }
        if let Some(url) = var(SHARE_BASE_URL_ENV) {
            config.share_base_url = url;
        }

        config.trash_retention_days = parse_number(
            TRASH_RETENTION_DAYS_ENV,
            var(TRASH_RETENTION_DAYS_ENV),
            DEFAULT_TRASH_RETENTION_DAYS,
        )?;
        config.anomaly_window = Duration::hours(parse_number(
            ANOMALY_WINDOW_HOURS_ENV,
            var(ANOMALY_WINDOW_HOURS_ENV),
            DEFAULT_ANOMALY_WINDOW_HOURS,
        )?);
        config.otp_expiry = Duration::seconds(parse_number(
            OTP_EXPIRY_ENV,
            var(OTP_EXPIRY_ENV),
            DEFAULT_OTP_EXPIRY_SECS,
        )?);
        config.search_rate_limit_max = parse_number(
            SEARCH_RATE_LIMIT_MAX_ENV,
            var(SEARCH_RATE_LIMIT_MAX_ENV),
            DEFAULT_SEARCH_RATE_LIMIT_MAX,
        )?;
        config.search_rate_limit_window = Duration::seconds(parse_number(
            SEARCH_RATE_LIMIT_WINDOW_ENV,
            var(SEARCH_RATE_LIMIT_WINDOW_ENV),
            DEFAULT_SEARCH_RATE_LIMIT_WINDOW_SECS,
        )?);
        if let Some(format) = var(LOG_FORMAT_ENV) {
            config.log_format = format.parse()?;
        }

        Ok(config)
    }

    /// Defaults rooted at `root`, with a fresh random JWT secret.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let paths = StoragePaths::new(root.into());
        let mut jwt_secret = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut jwt_secret);

        Self {
            key_file: paths.key_file(),
            paths,
            mirror_db_path: None,
            jwt_secret,
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
            trash_retention_days: DEFAULT_TRASH_RETENTION_DAYS,
            anomaly_window: Duration::hours(DEFAULT_ANOMALY_WINDOW_HOURS),
            otp_expiry: Duration::seconds(DEFAULT_OTP_EXPIRY_SECS),
            search_rate_limit_max: DEFAULT_SEARCH_RATE_LIMIT_MAX,
            search_rate_limit_window: Duration::seconds(DEFAULT_SEARCH_RATE_LIMIT_WINDOW_SECS),
            log_format: LogFormat::default(),
        }
    }

    /// Public URL of a share link.
    pub fn share_link(&self, token: &str) -> String {
        format!(
            "{}/api/share/{token}",
            self.share_base_url.trim_end_matches('/')
        )
    }
}

/// Parse a positive number, or fall back to `default` when unset.
fn parse_number<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.paths.root(), Path::new("/data"));
        assert_eq!(config.key_file, Path::new("/data/db/secret.key"));
        assert!(config.mirror_db_path.is_none());
        assert_eq!(config.jwt_secret.len(), 32);
        assert_eq!(config.trash_retention_days, 30);
        assert_eq!(config.anomaly_window, Duration::hours(24));
        assert_eq!(config.otp_expiry, Duration::seconds(180));
        assert_eq!(config.search_rate_limit_max, 30);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("DATA_DIR", "/srv/cloud"),
            ("MIRROR_DB_PATH", "/srv/mirror.redb"),
            ("JWT_SECRET", "s3cret"),
            ("TRASH_RETENTION_DAYS", "7"),
            ("OTP_EXPIRY", " 60 "),
            ("LOG_FORMAT", "JSON"),
            ("SHARE_BASE_URL", ""),
        ])
        .unwrap();

        assert_eq!(config.key_file, Path::new("/srv/cloud/db/secret.key"));
        assert_eq!(config.mirror_db_path.as_deref(), Some(Path::new("/srv/mirror.redb")));
        assert_eq!(config.jwt_secret, b"s3cret");
        assert_eq!(config.trash_retention_days, 7);
        assert_eq!(config.otp_expiry, Duration::seconds(60));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.share_base_url, DEFAULT_SHARE_BASE_URL);
    }

    #[test]
    fn rejects_bad_numbers() {
        for bad in ["zero", "0", "-3"] {
            let err = load(&[("TRASH_RETENTION_DAYS", bad)]).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    name: TRASH_RETENTION_DAYS_ENV,
                    ..
                }
            ));
        }
        assert!(load(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn share_links_trim_trailing_slash() {
        let mut config = Config::for_root("/tmp/x");
        config.share_base_url = "https://files.example.com/".into();
        assert_eq!(
            config.share_link("abc123"),
            "https://files.example.com/api/share/abc123"
        );
    }
}
