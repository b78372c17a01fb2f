//! Discord webhook payloads and message rendering.
//!
//! All notifications are rendered as a single webhook message with one embed.
//! The embed colour tells the kind apart at a glance: orange for a turn
//! notice, red for a rename request, yellow for a staleness warning.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::roster::Participant;
use crate::staleness::StalenessWarning;

/// Name the webhook posts under.
pub const BOT_USERNAME: &str = "Shadow Empire Assistant";

/// Embed thumbnail shown on every message.
pub const THUMBNAIL_URL: &str =
    "https://upload.wikimedia.org/wikipedia/en/4/4f/Shadow_Empire_cover.jpg";

/// Embed footer text.
pub const FOOTER_TEXT: &str = "PBEM Monitor";

pub const TURN_COLOR: u32 = 0xFF_A5_00;
pub const RENAME_COLOR: u32 = 0xFF_00_00;
pub const STALE_COLOR: u32 = 0xFF_D7_00;

/// Top-level webhook request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub username: String,
    pub content: String,
    pub embeds: Vec<Embed>,
}

/// Rich content section of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub color: u32,
    pub thumbnail: Thumbnail,
    pub fields: Vec<Field>,
    pub footer: Footer,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    pub text: String,
}

/// Discord mention markup for a participant.
#[must_use]
pub fn mention(participant: &Participant) -> String {
    format!("<@{}>", participant.notify_target)
}

/// The filename a player should give their save.
#[must_use]
pub fn save_name(game_name: &str, turn: u32, next_player: &str) -> String {
    format!("{game_name}_turn{turn}_{next_player}")
}

/// Formats a duration as a short human-readable string such as `2d 3h`.
#[must_use]
pub fn format_age(age: TimeDelta) -> String {
    let days = age.num_days();
    let hours = age.num_hours() % 24;
    let minutes = age.num_minutes() % 60;

    match (days, hours, minutes) {
        (d, h, _) if d > 0 => format!("{d}d {h}h"),
        (_, h, m) if h > 0 => format!("{h}h {m}m"),
        (_, _, m) if m > 0 => format!("{m}m"),
        _ => "<1m".to_string(),
    }
}

fn message(content: String, color: u32, field: Field, now: DateTime<Utc>) -> WebhookPayload {
    WebhookPayload {
        username: BOT_USERNAME.to_string(),
        content,
        embeds: vec![Embed {
            color,
            thumbnail: Thumbnail {
                url: THUMBNAIL_URL.to_string(),
            },
            fields: vec![field],
            footer: Footer {
                text: FOOTER_TEXT.to_string(),
            },
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }],
    }
}

/// Tells `current` it is their turn and how to name the save for `next`.
#[must_use]
pub fn turn_notice(
    game_name: &str,
    current: &Participant,
    next: &Participant,
    turn: u32,
    now: DateTime<Utc>,
) -> WebhookPayload {
    message(
        format!("🎲 It's your turn, {}!", mention(current)),
        TURN_COLOR,
        Field {
            name: "📋 Save File Instructions".to_string(),
            value: format!(
                "After completing your turn, please save the file as:\n```\n{}\n```",
                save_name(game_name, turn, &next.name)
            ),
        },
        now,
    )
}

/// Asks `recipient` to rename a save that lacks the game-name prefix.
#[must_use]
pub fn rename_notice(
    game_name: &str,
    recipient: &Participant,
    filename: &str,
    turn: u32,
    now: DateTime<Utc>,
) -> WebhookPayload {
    message(
        format!("⚠️ File naming issue detected in your save, {}!", mention(recipient)),
        RENAME_COLOR,
        Field {
            name: "📋 File Rename Required".to_string(),
            value: format!(
                "The save file you created `{filename}` doesn't match the configured game name.\n\n\
                 Please rename it to follow the format:\n```\n{}\n```\n\
                 *(Replace [NextPlayerName] with the next player's name)*",
                save_name(game_name, turn, "[NextPlayerName]")
            ),
        },
        now,
    )
}

/// Warns that the newest save has not changed within the age limit.
#[must_use]
pub fn staleness_warning(warning: &StalenessWarning, now: DateTime<Utc>) -> WebhookPayload {
    let content = match &warning.participant {
        Some(participant) => format!(
            "⏰ The game is waiting on you, {}!",
            mention(participant)
        ),
        None => "⏰ The game has gone quiet!".to_string(),
    };

    message(
        content,
        STALE_COLOR,
        Field {
            name: "🕰️ No Recent Saves".to_string(),
            value: format!(
                "The latest save `{}` was last modified {} ago (limit: {}).",
                warning.filename,
                format_age(warning.age),
                format_age(warning.limit)
            ),
        },
        now,
    )
}
