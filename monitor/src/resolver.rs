//! Turn resolution for stable save files.
//!
//! Given the name of a save file that has finished debouncing, the resolver
//! decides what it means for the game:
//!
//! 1. Files matching an ignore pattern are dropped silently.
//! 2. A `_turn<N>_` marker raises the turn counter when `N` is ahead of it.
//! 3. Files that do not start with the game name are misnamed; the player
//!    who should have produced the file is asked to rename it.
//! 4. Otherwise the player named in the file is the one whose turn it now is.
//!    They are told which name to give their save so the next player is
//!    picked up. When they close out a round, the turn counter advances.
//!
//! Resolution is pure apart from the turn counter it is handed; notifications
//! are the caller's job.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::roster::{Participant, Roster};

/// Default game-name prefix.
pub const DEFAULT_GAME_NAME: &str = "pbem1";

static TURN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_turn(\d+)_").expect("turn pattern is a valid regex"));

/// Extracts `N` from a `<anything>_turn<N>_<anything>` filename.
///
/// Returns `None` when there is no marker or the digits overflow.
#[must_use]
pub fn extract_turn_number(filename: &str) -> Option<u32> {
    TURN_PATTERN
        .captures(&filename.to_lowercase())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Why a file could not be attributed to anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// The file is misnamed and names no known player.
    MisnamedUnknownPlayer,
    /// The file has the right prefix but names no known player.
    UnknownPlayer,
}

/// The terminal decision for one save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The file matched an ignore pattern.
    Ignored { pattern: String },

    /// The file does not carry the game-name prefix. `recipient` is the player
    /// before the one named in the file, i.e. whoever saved it.
    RenameRequested {
        recipient: Participant,
        named: Participant,
        turn: u32,
    },

    /// The turn passes to `current`, who must label their save for `next`
    /// using `turn`.
    Handoff {
        previous: Participant,
        current: Participant,
        next: Participant,
        turn: u32,
    },

    /// Nobody could be matched; nothing is sent.
    Unresolved(Unresolved),
}

/// Applies the naming rules of the game to stable save files.
#[derive(Debug, Clone)]
pub struct TurnResolver {
    roster: Roster,
    game_name: String,
    ignore_patterns: Vec<String>,
}

impl TurnResolver {
    /// Creates a resolver.
    ///
    /// `game_name` is matched case-insensitively; an empty name falls back to
    /// [`DEFAULT_GAME_NAME`]. Ignore patterns are case-folded, trimmed and
    /// empty ones dropped.
    #[must_use]
    pub fn new(roster: Roster, game_name: &str, ignore_patterns: &[String]) -> Self {
        let game_name = match game_name.trim() {
            "" => DEFAULT_GAME_NAME.to_string(),
            name => name.to_lowercase(),
        };
        let ignore_patterns = ignore_patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            roster,
            game_name,
            ignore_patterns,
        }
    }

    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The case-folded game-name prefix.
    #[must_use]
    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    /// Returns the first ignore pattern contained in `filename`.
    #[must_use]
    pub fn ignore_match(&self, filename: &str) -> Option<&str> {
        let filename = filename.to_lowercase();
        self.ignore_patterns
            .iter()
            .find(|p| filename.contains(p.as_str()))
            .map(String::as_str)
    }

    /// Resolves one stable save file, updating `turn` as a side effect.
    ///
    /// `turn` never decreases.
    pub fn resolve(&self, filename: &str, turn: &mut u32) -> Resolution {
        let filename = filename.to_lowercase();

        if let Some(pattern) = self.ignore_match(&filename) {
            info!(file = %filename, pattern, "Ignoring file based on ignore patterns");
            return Resolution::Ignored {
                pattern: pattern.to_string(),
            };
        }

        if let Some(number) = extract_turn_number(&filename) {
            if number > *turn {
                *turn = number;
                info!(file = %filename, turn = *turn, "Updated current turn from filename");
            }
        }

        let matched = self.roster.index_of(&filename);

        if !filename.starts_with(&self.game_name) {
            warn!(
                file = %filename,
                game_name = %self.game_name,
                "File doesn't match configured game name"
            );
            return match matched {
                Some(index) => Resolution::RenameRequested {
                    recipient: self.participant(self.roster.previous(index)),
                    named: self.participant(index),
                    turn: *turn,
                },
                None => {
                    warn!(file = %filename, "Cannot identify any player for misnamed file");
                    Resolution::Unresolved(Unresolved::MisnamedUnknownPlayer)
                }
            };
        }

        let Some(index) = matched else {
            warn!(file = %filename, "Cannot match any player to save file");
            return Resolution::Unresolved(Unresolved::UnknownPlayer);
        };

        if self.roster.is_last(index) {
            *turn = turn.saturating_add(1);
            info!(turn = *turn, "Round complete, advancing turn");
        }

        Resolution::Handoff {
            previous: self.participant(self.roster.previous(index)),
            current: self.participant(index),
            next: self.participant(self.roster.next(index)),
            turn: *turn,
        }
    }

    fn participant(&self, index: usize) -> Participant {
        self.roster.by_order()[index].clone()
    }
}
