//! bahawatch CLI
//!
//! Scrape a whole thread once, or keep watching one for new posts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use bahawatch::{
    error::{AppError, Result},
    models::{Config, TargetInfo},
    monitor::{Monitor, TrackingRule},
    services::{Scraper, Selectors, Session, Transport},
    storage::SqliteStore,
};

/// bahawatch - Bahamut thread scraper & tracker
#[derive(Parser, Debug)]
#[command(name = "bahawatch", version, about = "Bahamut thread scraper & tracker")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a whole thread and print its pages as JSON
    Scrape {
        /// Thread URL carrying bsn and snA query parameters
        #[arg(long, conflicts_with_all = ["bsn", "sna"])]
        url: Option<String>,

        /// Board id
        #[arg(long, requires = "sna")]
        bsn: Option<u64>,

        /// Thread id
        #[arg(long, requires = "bsn")]
        sna: Option<u64>,

        /// Also sync the records into the local database
        #[arg(long)]
        sync: bool,
    },

    /// Watch a thread for new or edited floors
    Watch {
        /// Board id
        #[arg(long)]
        bsn: u64,

        /// Thread id
        #[arg(long)]
        sna: u64,

        /// Author id the last-page view is filtered by
        #[arg(long)]
        author: String,

        /// Seconds between polls (default from config)
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Failed polls tolerated before shutting down (default from config)
        #[arg(long)]
        max_failures: Option<u32>,
    },

    /// Validate configuration and markup selectors
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Forum credentials from the ACCOUNT/PASSWORD environment (or .env).
fn credentials() -> Result<(String, String)> {
    let account = std::env::var("ACCOUNT")
        .map_err(|_| AppError::config("ACCOUNT is not set (env or .env)"))?;
    let password = std::env::var("PASSWORD")
        .map_err(|_| AppError::config("PASSWORD is not set (env or .env)"))?;
    Ok((account, password))
}

/// Build a logged-in session.
async fn login_session(config: &Config) -> Result<Arc<Session>> {
    let (account, password) = credentials()?;
    let session = Arc::new(Session::new(&config.crawler)?);
    session.login(&account, &password).await?;
    Ok(session)
}

/// Resolve the scrape target from either form of the arguments.
fn resolve_target(url: Option<String>, bsn: Option<u64>, sna: Option<u64>) -> Result<TargetInfo> {
    match (url, bsn, sna) {
        (Some(url), _, _) => TargetInfo::from_url(&url),
        (None, Some(bsn), Some(sna)) => {
            let target = TargetInfo::new(bsn, sna);
            target.validate()?;
            Ok(target)
        }
        _ => Err(AppError::invalid_target(
            "pass either --url or both --bsn and --sna",
        )),
    }
}

/// Resolve when an interrupt or terminate signal arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => log::error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("received Ctrl+C"),
        _ = terminate => log::info!("received terminate signal"),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Scrape {
            url,
            bsn,
            sna,
            sync,
        } => {
            let target = resolve_target(url, bsn, sna)?;
            let session = login_session(&config).await?;
            let transport: Arc<dyn Transport> = session;

            let scraper = Scraper::new(transport, &config.crawler)?;
            let building = scraper.scrape_building(&target).await?;

            for page in &building.pages {
                println!("{}", serde_json::to_string_pretty(page)?);
            }

            if sync {
                let store = SqliteStore::open(&config.storage.db_path)?;
                let outcome = store.sync_building_tree(&building)?;
                log::info!(
                    "synced to {}: {} pages, {} floors, {} replies, {} failures",
                    config.storage.db_path,
                    outcome.pages,
                    outcome.floors,
                    outcome.replies,
                    outcome.failures
                );
            }

            log::info!("scrape complete");
        }

        Command::Watch {
            bsn,
            sna,
            author,
            interval_secs,
            max_failures,
        } => {
            let rule = TrackingRule::new(bsn, sna, author)?
                .with_poll_interval(Duration::from_secs(
                    interval_secs.unwrap_or(config.monitor.poll_interval_secs),
                ))
                .with_max_failures(max_failures.unwrap_or(config.monitor.max_failures));

            let session = login_session(&config).await?;
            let transport: Arc<dyn Transport> = session;

            let monitor = Monitor::new(transport, vec![rule])?
                .with_grace_period(Duration::from_millis(config.monitor.grace_period_ms));

            // The library exposes only the cancellation handle; OS signal
            // wiring stays here in the hosting process.
            let handle = monitor.shutdown_handle();
            tokio::spawn(async move {
                shutdown_signal().await;
                handle.request();
            });

            monitor.run().await?;
            log::info!("watch stopped");
        }

        Command::Validate => {
            config.validate()?;
            log::info!("config OK");

            Selectors::new()?;
            log::info!("selectors OK");

            log::info!("all validations passed");
        }
    }

    Ok(())
}
