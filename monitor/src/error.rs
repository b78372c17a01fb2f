//! Error type for the scan loop.
//!
//! Configuration problems have their own [`ConfigError`](crate::config::ConfigError)
//! and are reported before a [`Monitor`](crate::scanner::Monitor) exists.
//! Once running, the monitor only fails on directory reads and on building
//! its notifier.

use thiserror::Error;

use crate::notifier::NotifyError;

/// Errors returned by [`Monitor`](crate::scanner::Monitor) operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The watched directory could not be read.
    #[error("cannot read watch directory: {0}")]
    Io(#[from] std::io::Error),

    /// The notifier could not be set up.
    #[error("notifier setup failed: {0}")]
    Notify(#[from] NotifyError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
