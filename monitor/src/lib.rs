//! PBEM Monitor - play-by-email save directory watcher.
//!
//! This crate automates turn handoff for a play-by-email strategy game. The
//! players share a single save file through a synced directory; the monitor
//! polls that directory, works out whose turn it is from the save's name and
//! pings that player on Discord.
//!
//! # Overview
//!
//! Save files are expected to be named `<game>_turn<N>_<player>`, where
//! `<player>` is the player who should move next. New files are debounced so
//! partially synced saves are never acted on. Misnamed files trigger a rename
//! request to whoever saved them, and a game with no new saves for too long
//! triggers a staleness warning.
//!
//! # Modules
//!
//! - [`roster`]: Ordered player list and turn-order navigation
//! - [`tracker`]: Per-file debounce state machine
//! - [`resolver`]: Turn resolution from save filenames
//! - [`staleness`]: Stalled-game detection
//! - [`notifier`]: Notification delivery with retry
//! - [`discord`]: Discord webhook payloads and message rendering
//! - [`directory`]: Directory listing abstraction
//! - [`scanner`]: The polling scan loop tying it all together
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations

pub mod config;
pub mod directory;
pub mod discord;
pub mod error;
pub mod notifier;
pub mod resolver;
pub mod roster;
pub mod scanner;
pub mod staleness;
pub mod tracker;

pub use config::Config;
pub use directory::{DirEntry, DirectorySource, FsDirectory};
pub use error::{MonitorError, Result};
pub use notifier::{DiscordNotifier, Notifier, NotifyError, RetryPolicy};
pub use resolver::{Resolution, TurnResolver};
pub use roster::{Participant, Roster, RosterError};
pub use scanner::{Monitor, MonitorSettings, ScanReport, ScanState};
pub use staleness::{StalenessMonitor, StalenessWarning};
pub use tracker::{FileTracker, ScanOutcome, TrackedFile};
