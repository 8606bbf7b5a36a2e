//! Worker configuration loaded from environment variables.
//!
//! Loading fails fast: a required variable that is missing, or any variable
//! that does not parse, stops the worker before it touches the database.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use dirsync_connector::CredentialEncryption;
use dirsync_engine::{RunnerConfig, SyncError};

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Invalid runner configuration: {0}")]
    Runner(#[from] SyncError),
}

/// Everything the worker needs to start.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,

    /// Master key for provider credentials.
    pub encryption: CredentialEncryption,

    pub runner: RunnerConfig,

    /// Apply embedded migrations on startup.
    pub run_migrations: bool,

    /// Fallback log filter when `RUST_LOG` is unset.
    pub rust_log: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Required Variables
    ///
    /// - `DATABASE_URL` - PostgreSQL connection string
    /// - `DIRSYNC_ENCRYPTION_KEY` - 32-byte master key, hex or base64
    ///
    /// # Optional Variables
    ///
    /// - `DATABASE_MAX_CONNECTIONS` (default 5)
    /// - `DIRSYNC_SYNC_INTERVAL_SECS` (default 900)
    /// - `DIRSYNC_POLL_INTERVAL_SECS` (default 30)
    /// - `DIRSYNC_SYNC_TIMEOUT_SECS` (default 300)
    /// - `DIRSYNC_MAX_BACKOFF_SECS` (default 86400)
    /// - `DIRSYNC_MAX_CONSECUTIVE_FAILURES` (default 10)
    /// - `DIRSYNC_STALE_SYNC_SECS` (default 600)
    /// - `DIRSYNC_DIRECTORY_PAGE_SIZE` (default 100)
    /// - `DIRSYNC_DRY_RUN` (default false)
    /// - `DIRSYNC_RUN_MIGRATIONS` (default false)
    /// - `RUST_LOG` (default "info")
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup };

        let database_url = vars.required("DATABASE_URL")?;
        let key = vars.required("DIRSYNC_ENCRYPTION_KEY")?;
        let encryption =
            CredentialEncryption::from_encoded(&key).map_err(|e| ConfigError::InvalidValue {
                var: "DIRSYNC_ENCRYPTION_KEY".to_string(),
                message: e.to_string(),
            })?;

        let defaults = RunnerConfig::default();
        let runner = RunnerConfig {
            sync_interval: vars.secs("DIRSYNC_SYNC_INTERVAL_SECS", defaults.sync_interval)?,
            poll_interval: vars.secs("DIRSYNC_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            sync_timeout: vars.secs("DIRSYNC_SYNC_TIMEOUT_SECS", defaults.sync_timeout)?,
            max_backoff: vars.secs("DIRSYNC_MAX_BACKOFF_SECS", defaults.max_backoff)?,
            max_consecutive_failures: vars.parse(
                "DIRSYNC_MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            )?,
            stale_sync_threshold: vars
                .secs("DIRSYNC_STALE_SYNC_SECS", defaults.stale_sync_threshold)?,
            directory_page_size: vars
                .parse("DIRSYNC_DIRECTORY_PAGE_SIZE", defaults.directory_page_size)?,
            dry_run: vars.flag("DIRSYNC_DRY_RUN", defaults.dry_run)?,
        };
        runner.validate()?;

        Ok(Self {
            database_url,
            database_max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 5)?,
            encryption,
            runner,
            run_migrations: vars.flag("DIRSYNC_RUN_MIGRATIONS", false)?,
            rust_log: vars
                .optional("RUST_LOG")
                .unwrap_or_else(|| "info".to_string()),
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, var: &str) -> Result<String, ConfigError> {
        self.optional(var)
            .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
    }

    fn parse<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                var: var.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn secs(&self, var: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(var, default.as_secs()).map(Duration::from_secs)
    }

    fn flag(&self, var: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(var) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                other => Err(ConfigError::InvalidValue {
                    var: var.to_string(),
                    message: format!("expected a boolean, got {other:?}"),
                }),
            },
        }
    }
}
