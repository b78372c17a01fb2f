//! Debounce tracking for save files in the watched directory.
//!
//! Every regular file in the directory is tracked under its case-folded name.
//! A file goes through two states:
//!
//! ```text
//!  first observed            now - first_seen >= debounce
//! ───────────────▶  new  ─────────────────────────────────▶  stable
//!                    │                                          │
//!                    └──── file disappears: entry removed ◀─────┘
//! ```
//!
//! A stable file is reported by [`FileTracker::scan`] until the caller marks it
//! processed, after which it is never reported again while it stays on disk.
//!
//! Cloud-sync tools often write large saves incrementally, so a file is only
//! acted on after it has been continuously present for the debounce window.
//! If the size or modification time of a file that is still debouncing
//! changes, its window restarts.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::directory::DirEntry;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(30);

/// Size and modification time of a file, used to detect in-place rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

impl From<&DirEntry> for Fingerprint {
    fn from(entry: &DirEntry) -> Self {
        Self {
            size: entry.size,
            modified_at: entry.modified_at,
        }
    }
}

/// Tracking state for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Scan time at which the file was first observed (or its debounce last
    /// restarted).
    pub first_seen_at: DateTime<Utc>,

    /// Set once a terminal decision has been made for the file.
    pub processed: bool,

    /// Last observed size and modification time.
    pub fingerprint: Fingerprint,
}

/// What changed during a single scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Files seen for the first time.
    pub discovered: Vec<String>,

    /// Unprocessed files whose debounce window has elapsed, sorted by name.
    pub newly_stable: Vec<String>,

    /// Unprocessed files whose content changed, restarting their debounce.
    pub restarted: Vec<String>,

    /// Previously tracked files that are no longer present.
    pub removed: Vec<String>,
}

/// Case-folds a filename into its tracking key.
#[must_use]
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// Per-filename debounce state machine.
#[derive(Debug, Clone)]
pub struct FileTracker {
    files: HashMap<String, TrackedFile>,
    debounce: TimeDelta,
}

impl FileTracker {
    /// Creates an empty tracker with the given debounce window.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            files: HashMap::new(),
            debounce: TimeDelta::from_std(debounce).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Tracks every file in `entries` as already processed.
    ///
    /// Used at startup so that saves which predate the process never trigger
    /// notifications. Returns the number of files seeded.
    pub fn seed(&mut self, entries: &[DirEntry], now: DateTime<Utc>) -> usize {
        for entry in entries.iter().filter(|e| !e.is_dir) {
            self.files.insert(
                normalize(&entry.name),
                TrackedFile {
                    first_seen_at: now,
                    processed: true,
                    fingerprint: Fingerprint::from(entry),
                },
            );
        }
        self.files.len()
    }

    /// Feeds one directory listing through the tracker.
    ///
    /// New files start debouncing, debounced files are reported as
    /// `newly_stable`, and tracked files missing from `entries` are dropped.
    pub fn scan(&mut self, entries: &[DirEntry], now: DateTime<Utc>) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut present = HashSet::with_capacity(entries.len());

        for entry in entries.iter().filter(|e| !e.is_dir) {
            let key = normalize(&entry.name);
            // Two names differing only in case share a key; handle it once.
            if !present.insert(key.clone()) {
                continue;
            }
            let fingerprint = Fingerprint::from(entry);

            match self.files.get_mut(&key) {
                None => {
                    info!(file = %key, "New save file detected, starting debounce period");
                    self.files.insert(
                        key.clone(),
                        TrackedFile {
                            first_seen_at: now,
                            processed: false,
                            fingerprint,
                        },
                    );
                    outcome.discovered.push(key);
                }
                Some(tracked) if tracked.processed => {
                    tracked.fingerprint = fingerprint;
                }
                Some(tracked) if tracked.fingerprint != fingerprint => {
                    debug!(file = %key, "Save file changed during debounce, restarting");
                    tracked.fingerprint = fingerprint;
                    tracked.first_seen_at = now;
                    outcome.restarted.push(key);
                }
                Some(tracked) => {
                    if now - tracked.first_seen_at >= self.debounce {
                        outcome.newly_stable.push(key);
                    }
                }
            }
        }

        self.files.retain(|key, _| {
            let keep = present.contains(key);
            if !keep {
                info!(file = %key, "Removed tracking for deleted file");
                outcome.removed.push(key.clone());
            }
            keep
        });

        outcome.newly_stable.sort();
        outcome.removed.sort();
        outcome
    }

    /// Records a terminal decision for `key`. Returns `false` if the file is
    /// not tracked.
    pub fn mark_processed(&mut self, key: &str) -> bool {
        match self.files.get_mut(key) {
            Some(tracked) => {
                tracked.processed = true;
                true
            }
            None => false,
        }
    }

    /// Returns the tracking state for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TrackedFile> {
        self.files.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The configured debounce window.
    #[must_use]
    pub fn debounce(&self) -> TimeDelta {
        self.debounce
    }
}

impl Default for FileTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
