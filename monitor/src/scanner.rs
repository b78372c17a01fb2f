//! The polling scan loop.
//!
//! [`Monitor`] owns all mutable state of the process in a single
//! [`ScanState`] and drives the other modules once per tick:
//!
//! 1. List the watched directory. A failed read skips the tick and leaves the
//!    state untouched.
//! 2. Feed the listing through the [`FileTracker`].
//! 3. Resolve every newly stable file and send the resulting notification.
//!    Files are marked processed whatever the delivery outcome.
//! 4. Run the staleness check, which limits itself to once per interval.
//!
//! Ticks never overlap: a scan, including its notifications, finishes before
//! the next tick is taken.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use pbem_monitor::config::Config;
//! use pbem_monitor::scanner::Monitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let mut monitor = Monitor::start(&config, Utc::now())?;
//!     monitor.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::directory::{DirEntry, DirectorySource, FsDirectory};
use crate::error::Result;
use crate::notifier::{DiscordNotifier, Notifier, RetryPolicy};
use crate::resolver::{Resolution, TurnResolver};
use crate::staleness::{StalenessMonitor, StalenessWarning};
use crate::tracker::{FileTracker, ScanOutcome};

/// Turn number the game is assumed to be on at startup.
pub const INITIAL_TURN: u32 = 1;

/// Timing settings for the scan loop.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub watch_dir: PathBuf,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub stale_check_interval: Duration,
    pub stale_age_limit: Duration,
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            poll_interval: config.poll_interval,
            debounce: config.debounce,
            stale_check_interval: config.stale_check_interval,
            stale_age_limit: config.stale_age_limit,
        }
    }
}

/// All mutable state of the process.
#[derive(Debug, Clone)]
pub struct ScanState {
    /// Debounce and processed flags per file.
    pub tracker: FileTracker,

    /// Current turn number. Never decreases.
    pub turn: u32,

    /// Staleness check timing.
    pub staleness: StalenessMonitor,
}

/// The terminal decision made for one file during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub filename: String,
    pub resolution: Resolution,
    /// `None` when no notification was due, otherwise whether it was delivered.
    pub delivered: Option<bool>,
}

/// Summary of one completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    pub decisions: Vec<Decision>,
    pub stale: Option<StalenessWarning>,
    /// Turn number after the scan.
    pub turn: u32,
}

/// Directory watcher that hands turns from player to player.
pub struct Monitor<D> {
    settings: MonitorSettings,
    directory: D,
    resolver: TurnResolver,
    notifier: Arc<dyn Notifier>,
    state: ScanState,
}

impl<D: std::fmt::Debug> std::fmt::Debug for Monitor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("settings", &self.settings)
            .field("directory", &self.directory)
            .field("resolver", &self.resolver)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Monitor<FsDirectory> {
    /// Builds the production monitor: Discord delivery, the real filesystem,
    /// and every file already in the watch directory seeded as processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook URL is invalid or the watch directory
    /// cannot be read.
    pub fn start(config: &Config, now: DateTime<Utc>) -> Result<Self> {
        let notifier = DiscordNotifier::new(
            config.webhook_url.as_deref(),
            &config.game_name,
            RetryPolicy::default(),
        )?;

        let mut monitor = Self::from_config(config, FsDirectory, Arc::new(notifier), now);
        monitor.initialize(now)?;
        Ok(monitor)
    }
}

impl<D: DirectorySource> Monitor<D> {
    /// Creates a monitor. The first staleness check falls one check interval
    /// after `started_at`.
    #[must_use]
    pub fn new(
        settings: MonitorSettings,
        directory: D,
        resolver: TurnResolver,
        notifier: Arc<dyn Notifier>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let state = ScanState {
            tracker: FileTracker::new(settings.debounce),
            turn: INITIAL_TURN,
            staleness: StalenessMonitor::new(
                settings.stale_check_interval,
                settings.stale_age_limit,
                started_at,
            ),
        };

        Self {
            settings,
            directory,
            resolver,
            notifier,
            state,
        }
    }

    /// Creates a monitor from loaded configuration.
    #[must_use]
    pub fn from_config(
        config: &Config,
        directory: D,
        notifier: Arc<dyn Notifier>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let resolver = TurnResolver::new(
            config.roster.clone(),
            &config.game_name,
            &config.ignore_patterns,
        );
        Self::new(
            MonitorSettings::from(config),
            directory,
            resolver,
            notifier,
            started_at,
        )
    }

    #[must_use]
    pub fn state(&self) -> &ScanState {
        &self.state
    }

    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.settings.watch_dir
    }

    /// Marks every file already in the directory as processed so that only
    /// saves arriving after startup trigger notifications.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Io`](crate::error::MonitorError::Io) if the
    /// directory cannot be read.
    pub fn initialize(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let entries = self.directory.list_entries(&self.settings.watch_dir)?;
        let seeded = self.state.tracker.seed(&entries, now);
        info!(existing_files = seeded, "Initialized with existing files");
        Ok(seeded)
    }

    /// Lists the directory and processes the result.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Io`](crate::error::MonitorError::Io) if the
    /// directory cannot be read; the state is left unchanged in that case.
    pub async fn scan_once(&mut self, now: DateTime<Utc>) -> Result<ScanReport> {
        let entries = self.directory.list_entries(&self.settings.watch_dir)?;
        Ok(self.process(&entries, now).await)
    }

    /// Processes one directory listing taken at `now`.
    pub async fn process(&mut self, entries: &[DirEntry], now: DateTime<Utc>) -> ScanReport {
        let outcome = self.state.tracker.scan(entries, now);
        let mut decisions = Vec::with_capacity(outcome.newly_stable.len());

        for filename in &outcome.newly_stable {
            debug!(file = %filename, "File stable, processing now");
            let resolution = self.resolver.resolve(filename, &mut self.state.turn);
            let delivered = self.notify(filename, &resolution).await;
            self.state.tracker.mark_processed(filename);

            decisions.push(Decision {
                filename: filename.clone(),
                resolution,
                delivered,
            });
        }

        let stale = self
            .state
            .staleness
            .check(now, entries, self.resolver.roster());
        if let Some(warning) = &stale {
            if let Err(e) = self.notifier.send_staleness_warning(warning).await {
                error!(file = %warning.filename, error = %e, "Failed to send staleness warning");
            }
        }

        ScanReport {
            outcome,
            decisions,
            stale,
            turn: self.state.turn,
        }
    }

    /// Sends the notification a resolution calls for.
    async fn notify(&self, filename: &str, resolution: &Resolution) -> Option<bool> {
        let result = match resolution {
            Resolution::Ignored { .. } | Resolution::Unresolved(_) => return None,
            Resolution::RenameRequested {
                recipient, turn, ..
            } => {
                info!(
                    file = %filename,
                    recipient = %recipient,
                    "Sending rename notification to previous player"
                );
                self.notifier
                    .send_rename_notice(recipient, filename, *turn)
                    .await
            }
            Resolution::Handoff {
                previous,
                current,
                next,
                turn,
            } => {
                info!(
                    turn = *turn,
                    from = %previous.name,
                    to = %current.name,
                    next = %next.name,
                    "Turn passing"
                );
                self.notifier.send_turn_notice(current, next, *turn).await
            }
        };

        match result {
            Ok(()) => Some(true),
            Err(e) => {
                error!(file = %filename, error = %e, "Failed to deliver notification");
                Some(false)
            }
        }
    }

    /// Scans on every poll interval until `shutdown` completes.
    ///
    /// The first scan happens one interval after the call. A failed directory
    /// read is logged and retried on the next tick.
    pub async fn run<S>(&mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            watch_dir = %self.settings.watch_dir.display(),
            poll_interval_ms = self.settings.poll_interval.as_millis(),
            "Started monitoring directory"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once(Utc::now()).await {
                        warn!(
                            watch_dir = %self.settings.watch_dir.display(),
                            error = %e,
                            "Error reading directory, skipping scan"
                        );
                    }
                }
            }
        }
    }
}
