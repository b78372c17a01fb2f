//! Player roster for a play-by-email game.
//!
//! The roster is the fixed, cyclic turn order of the game. It is built once at
//! startup from the `USER_MAPPINGS` setting and never changes afterwards.
//!
//! # Format
//!
//! ```text
//! 1 Alice 111111111111111111,2 Bob 222222222222222222,3 Cara 333333333333333333
//! ```
//!
//! Entries are comma-separated. Each entry holds three space-separated fields:
//! turn order, display name and notification target (a Discord user id).
//!
//! # Example
//!
//! ```
//! use pbem_monitor::roster::Roster;
//!
//! let roster: Roster = "2 Bob B#2,1 Alice A#1".parse().unwrap();
//! assert_eq!(roster.len(), 2);
//! assert_eq!(roster.by_order()[0].name, "Alice");
//! assert_eq!(roster.index_of("pbem1_turn3_bob"), Some(1));
//! assert_eq!(roster.next(1), 0);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// Errors that can occur while building a roster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    /// An entry has the wrong number of fields, an empty field, or an order
    /// that is not a non-negative integer.
    #[error("malformed roster entry {position}: {message}")]
    MalformedEntry { position: usize, message: String },

    /// Two entries share the same order value.
    #[error("duplicate order number {0} in roster")]
    DuplicateOrder(u32),

    /// No entries were supplied.
    #[error("roster is empty")]
    EmptyRoster,
}

/// A single player in the turn order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Position in the turn order. Unique within a roster.
    pub order: u32,

    /// Display name, also the substring searched for in save filenames.
    pub name: String,

    /// Identifier used to address the player in notifications.
    pub notify_target: String,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.notify_target)
    }
}

/// The ordered, immutable list of participants.
#[derive(Debug, Clone)]
pub struct Roster {
    participants: Vec<Participant>,
    /// Lower-cased display names, index-aligned with `participants`.
    match_keys: Vec<String>,
}

impl Roster {
    /// Builds a roster from structured `(order, name, target)` entries.
    ///
    /// Entries may arrive in any order; the roster is sorted by ascending
    /// order. Orders that do not form the sequence `1..=n` only produce a
    /// warning.
    ///
    /// # Errors
    ///
    /// - [`RosterError::MalformedEntry`] when an entry does not have exactly
    ///   three non-empty fields or its order does not parse
    /// - [`RosterError::DuplicateOrder`] when two entries share an order
    /// - [`RosterError::EmptyRoster`] when no entries are supplied
    pub fn load<I, F, S>(entries: I) -> Result<Self, RosterError>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut participants = Vec::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let position = index + 1;
            let fields = entry.as_ref();

            let [order, name, target] = fields else {
                return Err(RosterError::MalformedEntry {
                    position,
                    message: format!(
                        "expected 'order name target', got {} field(s)",
                        fields.len()
                    ),
                });
            };
            let (order, name, target) = (
                order.as_ref().trim(),
                name.as_ref().trim(),
                target.as_ref().trim(),
            );

            if order.is_empty() || name.is_empty() || target.is_empty() {
                return Err(RosterError::MalformedEntry {
                    position,
                    message: "order, name and target must all be non-empty".to_string(),
                });
            }

            let order = Some(order)
                .filter(|o| o.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|o| o.parse::<u32>().ok())
                .filter(|&o| o > 0)
                .ok_or_else(|| RosterError::MalformedEntry {
                    position,
                    message: format!("invalid order number '{order}'"),
                })?;

            participants.push(Participant {
                order,
                name: name.to_string(),
                notify_target: target.to_string(),
            });
        }

        if participants.is_empty() {
            return Err(RosterError::EmptyRoster);
        }

        participants.sort_by_key(|p| p.order);

        let mut seen = HashSet::with_capacity(participants.len());
        for participant in &participants {
            if !seen.insert(participant.order) {
                return Err(RosterError::DuplicateOrder(participant.order));
            }
        }

        let roster = Self {
            match_keys: participants.iter().map(|p| p.name.to_lowercase()).collect(),
            participants,
        };

        if let Some((position, order)) = roster.first_order_gap() {
            warn!(
                position,
                order, "Roster order numbers are not sequential starting from 1"
            );
        }

        Ok(roster)
    }

    /// Number of participants. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Always `false`; an empty roster cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants sorted by ascending turn order.
    #[must_use]
    pub fn by_order(&self) -> &[Participant] {
        &self.participants
    }

    /// Returns the participant at `index` in turn order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Participant> {
        self.participants.get(index)
    }

    /// Finds the first participant (in turn order) whose display name occurs
    /// in `text`, ignoring case.
    ///
    /// When several names match, the lowest order wins.
    #[must_use]
    pub fn index_of(&self, text: &str) -> Option<usize> {
        let text = text.to_lowercase();
        self.match_keys.iter().position(|key| text.contains(key.as_str()))
    }

    /// Like [`Roster::index_of`] but returns the participant itself.
    #[must_use]
    pub fn find_in(&self, text: &str) -> Option<&Participant> {
        self.index_of(text).map(|i| &self.participants[i])
    }

    /// Index of the participant after `index`, wrapping to the first.
    #[must_use]
    pub fn next(&self, index: usize) -> usize {
        (index + 1) % self.len()
    }

    /// Index of the participant before `index`, wrapping to the last.
    #[must_use]
    pub fn previous(&self, index: usize) -> usize {
        (index + self.len() - 1) % self.len()
    }

    /// Whether `index` is the final participant of a round.
    #[must_use]
    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.len()
    }

    /// Returns the first `(position, order)` where the orders stop matching
    /// the sequence `1, 2, 3, ...`. Positions are 1-based.
    fn first_order_gap(&self) -> Option<(usize, u32)> {
        self.participants
            .iter()
            .enumerate()
            .find(|(i, p)| u64::from(p.order) != *i as u64 + 1)
            .map(|(i, p)| (i + 1, p.order))
    }
}

impl FromStr for Roster {
    type Err = RosterError;

    /// Parses the `USER_MAPPINGS` format. Blank entries are skipped so a
    /// trailing comma is harmless.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let entries: Vec<Vec<&str>> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.splitn(3, ' ').collect())
            .collect();

        Self::load(entries)
    }
}
