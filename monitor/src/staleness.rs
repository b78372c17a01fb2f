//! Detection of stalled games.
//!
//! When the newest save in the directory has not changed for longer than the
//! age limit, the player who holds the turn has probably forgotten about it.
//! The check runs on its own interval, independent of the scan cadence, so a
//! stalled game produces one warning per interval rather than one per scan.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::directory::DirEntry;
use crate::roster::{Participant, Roster};
use crate::tracker::normalize;

/// Default interval between staleness checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default age after which the newest save counts as stale.
pub const DEFAULT_AGE_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// A stalled-game warning ready to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessWarning {
    /// Normalized name of the newest save file.
    pub filename: String,

    /// Time since the file was last modified.
    pub age: TimeDelta,

    /// The configured age limit.
    pub limit: TimeDelta,

    /// The player named in the file, if any.
    pub participant: Option<Participant>,
}

/// Returns the regular file with the latest modification time.
#[must_use]
pub fn newest_entry(entries: &[DirEntry]) -> Option<&DirEntry> {
    entries
        .iter()
        .filter(|e| !e.is_dir)
        .max_by_key(|e| e.modified_at)
}

/// Interval-gated check of the newest save's age.
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    check_interval: TimeDelta,
    age_limit: TimeDelta,
    last_check: DateTime<Utc>,
}

impl StalenessMonitor {
    /// Creates a monitor whose first check falls one interval after
    /// `started_at`.
    #[must_use]
    pub fn new(check_interval: Duration, age_limit: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            check_interval: TimeDelta::from_std(check_interval).unwrap_or(TimeDelta::MAX),
            age_limit: TimeDelta::from_std(age_limit).unwrap_or(TimeDelta::MAX),
            last_check: started_at,
        }
    }

    /// Whether a full check interval has elapsed since the last check.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now - self.last_check >= self.check_interval
    }

    /// Time of the last completed check (or construction).
    #[must_use]
    pub fn last_check(&self) -> DateTime<Utc> {
        self.last_check
    }

    /// Runs a check if one is due.
    ///
    /// A due check always resets the interval, whether or not it finds a stale
    /// file. Returns a warning when the newest of `entries` is older than the
    /// age limit.
    pub fn check(
        &mut self,
        now: DateTime<Utc>,
        entries: &[DirEntry],
        roster: &Roster,
    ) -> Option<StalenessWarning> {
        if !self.is_due(now) {
            return None;
        }
        self.last_check = now;

        let Some(newest) = newest_entry(entries) else {
            debug!("Staleness check found no save files");
            return None;
        };

        let age = now - newest.modified_at;
        if age <= self.age_limit {
            debug!(
                file = %newest.name,
                age_secs = age.num_seconds(),
                "Newest save is within the age limit"
            );
            return None;
        }

        let filename = normalize(&newest.name);
        info!(
            file = %filename,
            age_hours = age.num_hours(),
            limit_hours = self.age_limit.num_hours(),
            "Newest save file is stale"
        );

        Some(StalenessWarning {
            participant: roster.find_in(&filename).cloned(),
            filename,
            age,
            limit: self.age_limit,
        })
    }
}
