//! Configuration module for PBEM Monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `USER_MAPPINGS` | Yes | - | Roster, e.g. `1 Alice 1111,2 Bob 2222` |
//! | `GAME_NAME` | No | `pbem1` | Save filename prefix |
//! | `DISCORD_WEBHOOK_URL` | No | - | Webhook notifications are posted to |
//! | `WATCH_DIRECTORY` | No | `./data` | Directory holding the save files |
//! | `IGNORE_PATTERNS` | No | (none) | Comma-separated substrings to skip |
//! | `FILE_DEBOUNCE_MS` | No | 30000 | Time a new file must sit before it is handled |
//! | `POLL_INTERVAL_MS` | No | 5000 | Time between directory scans |
//! | `STALE_CHECK_INTERVAL_HOURS` | No | 24 | Time between staleness checks |
//! | `STALE_AGE_LIMIT_HOURS` | No | 24 | Age at which the newest save counts as stale |
//!
//! # Example
//!
//! ```no_run
//! use pbem_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Watching: {}", config.watch_dir.display());
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::resolver::DEFAULT_GAME_NAME;
use crate::roster::{Roster, RosterError};

/// Default watched directory.
const DEFAULT_WATCH_DIR: &str = "./data";

/// Default debounce window in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 30_000;

/// Default scan interval in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default staleness check interval in hours.
const DEFAULT_STALE_CHECK_HOURS: u64 = 24;

/// Default staleness age limit in hours.
const DEFAULT_STALE_AGE_HOURS: u64 = 24;

const SECS_PER_HOUR: u64 = 60 * 60;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The roster definition could not be parsed.
    #[error("invalid USER_MAPPINGS: {0} (expected e.g. '1 User1 ID1,2 User2 ID2')")]
    Roster(#[from] RosterError),

    /// The `.env` file exists but could not be loaded.
    #[error("failed to load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

/// Configuration for the PBEM Monitor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Players in turn order.
    pub roster: Roster,

    /// Save filename prefix, matched case-insensitively.
    pub game_name: String,

    /// Discord webhook URL. When `None`, notifications cannot be delivered.
    pub webhook_url: Option<String>,

    /// Directory polled for save files.
    pub watch_dir: PathBuf,

    /// Lower-cased substrings that mark files to skip.
    pub ignore_patterns: Vec<String>,

    /// How long a new file must remain before it is handled.
    pub debounce: Duration,

    /// Time between directory scans.
    pub poll_interval: Duration,

    /// Time between staleness checks.
    pub stale_check_interval: Duration,

    /// Age after which the newest save is considered stale.
    pub stale_age_limit: Duration,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `USER_MAPPINGS` is not set or is not a valid roster
    /// - A numeric setting is set but is not a positive integer
    ///   (`FILE_DEBOUNCE_MS` may be 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: USER_MAPPINGS
        let roster = env::var("USER_MAPPINGS")
            .map_err(|_| ConfigError::MissingEnvVar("USER_MAPPINGS".to_string()))?
            .parse::<Roster>()?;

        // Optional: GAME_NAME (default: pbem1)
        let game_name = env::var("GAME_NAME")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_GAME_NAME.to_string());

        // Optional: DISCORD_WEBHOOK_URL
        let webhook_url = env::var("DISCORD_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        // Optional: WATCH_DIRECTORY (default: ./data)
        let watch_dir = env::var("WATCH_DIRECTORY")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_WATCH_DIR), PathBuf::from);

        // Optional: IGNORE_PATTERNS (default: none)
        let ignore_patterns = env::var("IGNORE_PATTERNS")
            .map(|val| parse_ignore_patterns(&val))
            .unwrap_or_default();

        let debounce = Duration::from_millis(parse_u64("FILE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS, true)?);
        let poll_interval =
            Duration::from_millis(parse_u64("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS, false)?);
        let stale_check_interval = Duration::from_secs(
            parse_u64("STALE_CHECK_INTERVAL_HOURS", DEFAULT_STALE_CHECK_HOURS, false)?
                .saturating_mul(SECS_PER_HOUR),
        );
        let stale_age_limit = Duration::from_secs(
            parse_u64("STALE_AGE_LIMIT_HOURS", DEFAULT_STALE_AGE_HOURS, false)?
                .saturating_mul(SECS_PER_HOUR),
        );

        Ok(Self {
            roster,
            game_name,
            webhook_url,
            watch_dir,
            ignore_patterns,
            debounce,
            poll_interval,
            stale_check_interval,
            stale_age_limit,
        })
    }

    /// Loads a `.env` file from `dir` when the key settings are not already
    /// present in the environment.
    ///
    /// Returns `true` if a file was loaded. Variables already set in the
    /// process environment are never overridden.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_env_file(dir: &Path) -> Result<bool, ConfigError> {
        if env::var_os("USER_MAPPINGS").is_some() && env::var_os("GAME_NAME").is_some() {
            return Ok(false);
        }

        let path = dir.join(".env");
        if !path.exists() {
            return Ok(false);
        }

        dotenvy::from_path(&path)?;
        Ok(true)
    }
}

/// Splits a comma-separated pattern list, trimming and lower-casing items and
/// dropping empty ones.
fn parse_ignore_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads an optional non-negative integer setting.
fn parse_u64(key: &str, default: u64, allow_zero: bool) -> Result<u64, ConfigError> {
    let Some(val) = env::var(key).ok().filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };

    let parsed = val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected non-negative integer, got '{val}'"),
    })?;

    if parsed == 0 && !allow_zero {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }

    Ok(parsed)
}
