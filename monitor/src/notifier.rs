//! Notification delivery.
//!
//! The scan loop talks to a [`Notifier`]; [`DiscordNotifier`] is the
//! production implementation that posts to a Discord webhook with:
//!
//! - `wait=true` appended to the webhook URL so Discord confirms delivery
//! - Up to 3 attempts per message
//! - Linear backoff between attempts (1s, 2s, ... with ±25% jitter)
//! - Rate limit handling (429 with Retry-After header, else 3s, 6s, ...)
//! - Every other non-success status retried like a transport error
//!
//! Delivery failures are returned to the caller, which only logs them.
//!
//! # Example
//!
//! ```no_run
//! use pbem_monitor::notifier::{DiscordNotifier, Notifier, RetryPolicy};
//! use pbem_monitor::roster::Roster;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roster: Roster = "1 Alice 111,2 Bob 222".parse()?;
//!     let notifier = DiscordNotifier::new(
//!         Some("https://discord.com/api/webhooks/1/abc"),
//!         "pbem1",
//!         RetryPolicy::default(),
//!     )?;
//!
//!     let players = roster.by_order();
//!     notifier.send_turn_notice(&players[0], &players[1], 1).await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::discord::{self, WebhookPayload};
use crate::roster::Participant;
use crate::staleness::StalenessWarning;

/// Default maximum number of delivery attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff unit for transport errors and unexpected statuses.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Base backoff unit when rate limited without a Retry-After header.
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(3);

/// Upper bound on any single wait, including server-provided Retry-After.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Jitter factor (±25%).
const JITTER_FACTOR: f64 = 0.25;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while delivering a notification.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// No webhook URL was configured.
    #[error("webhook URL not configured")]
    NotConfigured,

    /// The configured webhook URL cannot be parsed.
    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    /// HTTP transport failure after all attempts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered with a non-success status.
    #[error("webhook returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Still rate limited after all attempts.
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },
}

/// Capability the scan loop uses to reach players.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tells `current` their turn has begun and that their save should be
    /// labelled for `next` with `turn`.
    async fn send_turn_notice(
        &self,
        current: &Participant,
        next: &Participant,
        turn: u32,
    ) -> Result<(), NotifyError>;

    /// Asks `recipient` to rename `filename` to the game's naming scheme.
    async fn send_rename_notice(
        &self,
        recipient: &Participant,
        filename: &str,
        turn: u32,
    ) -> Result<(), NotifyError>;

    /// Warns that the game has stalled.
    async fn send_staleness_warning(&self, warning: &StalenessWarning) -> Result<(), NotifyError>;
}

/// Attempt budget and backoff timing for webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per message, including the first.
    pub max_attempts: u32,

    /// Wait after the n-th failed attempt is `n * base_delay`.
    pub base_delay: Duration,

    /// Wait after the n-th rate-limited attempt without Retry-After is
    /// `n * rate_limit_delay`.
    pub rate_limit_delay: Duration,

    /// Cap on any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Millisecond-scale delays so retry paths can be exercised in tests.
    #[must_use]
    pub fn fast_for_tests() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1),
            rate_limit_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    /// Backoff after the given failed attempt (1-based).
    #[must_use]
    pub fn error_delay(&self, attempt: u32) -> Duration {
        (self.base_delay * attempt).min(self.max_delay)
    }

    /// Backoff after a rate-limited attempt, preferring the server's hint.
    #[must_use]
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.rate_limit_delay * attempt)
            .min(self.max_delay)
    }
}

/// Posts notifications to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: Option<Url>,
    game_name: String,
    policy: RetryPolicy,
}

impl DiscordNotifier {
    /// Creates a notifier.
    ///
    /// A missing `webhook_url` is allowed so the monitor can still run and log
    /// decisions; every send then fails with [`NotifyError::NotConfigured`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the HTTP client cannot
    /// be built.
    pub fn new(
        webhook_url: Option<&str>,
        game_name: &str,
        policy: RetryPolicy,
    ) -> Result<Self, NotifyError> {
        let webhook_url = webhook_url.map(prepare_webhook_url).transpose()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            webhook_url,
            game_name: game_name.to_string(),
            policy,
        })
    }

    /// The URL messages are posted to, with `wait=true` applied.
    #[must_use]
    pub fn webhook_url(&self) -> Option<&Url> {
        self.webhook_url.as_ref()
    }

    /// Posts one payload, retrying transient failures.
    async fn deliver(
        &self,
        kind: &'static str,
        recipient: Option<&Participant>,
        payload: &WebhookPayload,
    ) -> Result<(), NotifyError> {
        let url = self.webhook_url.as_ref().ok_or(NotifyError::NotConfigured)?;
        let recipient = recipient.map_or_else(|| "everyone".to_string(), ToString::to_string);
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let last_attempt = attempt >= max_attempts;

            debug!(kind, recipient = %recipient, attempt, "Sending webhook");

            let response = match self.client.post(url.clone()).json(payload).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(kind, attempt, error = %e, "Failed to send notification");
                    if last_attempt {
                        error!(kind, recipient = %recipient, "Giving up on notification");
                        return Err(NotifyError::Http(e));
                    }
                    self.wait(self.policy.error_delay(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            match status {
                StatusCode::OK | StatusCode::NO_CONTENT => {
                    info!(kind, recipient = %recipient, status = status.as_u16(), "Notification sent");
                    return Ok(());
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = parse_retry_after(&response);
                    let body = response.text().await.unwrap_or_default();
                    warn!(kind, attempt, body = %body, "Webhook rate limit hit");
                    if last_attempt {
                        error!(kind, recipient = %recipient, "Giving up on notification");
                        return Err(NotifyError::RateLimited { attempts: attempt });
                    }
                    self.wait(self.policy.rate_limit_delay(attempt, retry_after))
                        .await;
                }
                _ => {
                    let message = response.text().await.unwrap_or_default();
                    warn!(
                        kind,
                        attempt,
                        status = status.as_u16(),
                        message = %message,
                        "Unexpected webhook status"
                    );
                    if last_attempt {
                        error!(kind, recipient = %recipient, "Giving up on notification");
                        return Err(NotifyError::Status {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    self.wait(self.policy.error_delay(attempt)).await;
                }
            }
        }
    }

    async fn wait(&self, delay: Duration) {
        let delay = add_jitter(delay);
        debug!(delay_ms = delay.as_millis(), "Waiting before retry");
        sleep(delay).await;
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_turn_notice(
        &self,
        current: &Participant,
        next: &Participant,
        turn: u32,
    ) -> Result<(), NotifyError> {
        let payload = discord::turn_notice(&self.game_name, current, next, turn, Utc::now());
        self.deliver("turn", Some(current), &payload).await
    }

    async fn send_rename_notice(
        &self,
        recipient: &Participant,
        filename: &str,
        turn: u32,
    ) -> Result<(), NotifyError> {
        let payload = discord::rename_notice(&self.game_name, recipient, filename, turn, Utc::now());
        self.deliver("rename", Some(recipient), &payload).await
    }

    async fn send_staleness_warning(&self, warning: &StalenessWarning) -> Result<(), NotifyError> {
        let payload = discord::staleness_warning(warning, Utc::now());
        self.deliver("staleness", warning.participant.as_ref(), &payload)
            .await
    }
}

/// Parses a webhook URL and forces `wait=true`.
fn prepare_webhook_url(raw: &str) -> Result<Url, NotifyError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| NotifyError::InvalidUrl(e.to_string()))?;

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "wait")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("wait", "true");

    Ok(url)
}

/// Reads a Retry-After header, which Discord may send as fractional seconds.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Adds ±25% jitter to a duration.
fn add_jitter(duration: Duration) -> Duration {
    if duration.is_zero() {
        return duration;
    }
    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * JITTER_FACTOR;
    let jitter = rng.random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((duration.as_secs_f64() + jitter).max(0.0))
}
