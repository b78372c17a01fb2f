//! PBEM Monitor - play-by-email save directory watcher.
//!
//! This binary watches a shared save directory and notifies the next player
//! on Discord whenever a new turn file appears.
//!
//! # Commands
//!
//! - `pbem-monitor run`: Start the monitor daemon
//! - `pbem-monitor check`: Validate configuration and print the roster
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pbem_monitor::config::Config;
use pbem_monitor::scanner::Monitor;

/// PBEM Monitor - play-by-email turn notifier.
///
/// Watches a directory of save files and pings the player whose turn it is.
#[derive(Parser, Debug)]
#[command(name = "pbem-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    USER_MAPPINGS               Roster, e.g. '1 Alice 1111,2 Bob 2222' (required)
    GAME_NAME                   Save filename prefix (default: pbem1)
    DISCORD_WEBHOOK_URL         Discord webhook for notifications
    WATCH_DIRECTORY             Directory to watch (default: ./data)
    IGNORE_PATTERNS             Comma-separated substrings to ignore
    FILE_DEBOUNCE_MS            Debounce window (default: 30000)
    POLL_INTERVAL_MS            Scan interval (default: 5000)
    STALE_CHECK_INTERVAL_HOURS  Staleness check interval (default: 24)
    STALE_AGE_LIMIT_HOURS       Staleness age limit (default: 24)
    LOG_FORMAT                  Set to 'json' for JSON logs

A .env file in the working directory is loaded when USER_MAPPINGS or
GAME_NAME is not set.

EXAMPLES:
    # Validate configuration
    pbem-monitor check

    # Start the monitor
    export USER_MAPPINGS='1 Alice 1111,2 Bob 2222'
    export DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/...
    pbem-monitor run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the monitor daemon.
    ///
    /// Polls the watch directory and sends turn notifications until stopped.
    Run,

    /// Validate configuration and print the roster in turn order.
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Must precede init_logging: .env may set RUST_LOG and LOG_FORMAT.
    let env_file_loaded =
        Config::load_env_file(Path::new(".")).context("Failed to load .env file")?;

    init_logging();

    if env_file_loaded {
        info!("Using environment variables from .env file");
    }

    match cli.command {
        Command::Check => run_check(),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_monitor())
        }
    }
}

/// Loads configuration and prints what the daemon would use.
fn run_check() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    println!("Configuration OK");
    println!();
    println!("Game name:        {}", config.game_name);
    println!("Watch directory:  {}", config.watch_dir.display());
    println!(
        "Webhook:          {}",
        if config.webhook_url.is_some() { "configured" } else { "NOT SET" }
    );
    println!("Debounce:         {:?}", config.debounce);
    println!("Poll interval:    {:?}", config.poll_interval);
    println!("Stale check:      {:?}", config.stale_check_interval);
    println!("Stale age limit:  {:?}", config.stale_age_limit);
    if !config.ignore_patterns.is_empty() {
        println!("Ignore patterns:  {}", config.ignore_patterns.join(", "));
    }
    println!();
    println!("Turn order:");
    for participant in config.roster.by_order() {
        println!(
            "  {:>3}. {} ({})",
            participant.order, participant.name, participant.notify_target
        );
    }

    Ok(())
}

/// Runs the monitor daemon.
async fn run_monitor() -> Result<()> {
    info!("Starting PBEM Monitor");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        game_name = %config.game_name,
        watch_dir = %config.watch_dir.display(),
        debounce_ms = config.debounce.as_millis(),
        ignore_patterns = config.ignore_patterns.len(),
        "Configuration loaded"
    );
    for participant in config.roster.by_order() {
        info!(
            order = participant.order,
            name = %participant.name,
            target = %participant.notify_target,
            "Loaded player"
        );
    }

    if config.webhook_url.is_none() {
        warn!("DISCORD_WEBHOOK_URL is not set, notifications will fail");
    }

    let mut monitor = Monitor::start(&config, Utc::now()).with_context(|| {
        format!(
            "Failed to start monitoring {}",
            config.watch_dir.display()
        )
    })?;

    info!("Monitor running. Press Ctrl+C to stop.");

    monitor.run(wait_for_shutdown()).await;

    info!(turn = monitor.state().turn, "Monitor stopped");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
