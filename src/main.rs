//! # Infopiguła Digest
//!
//! A long-running service that collects the news items listed on
//! [Infopiguła](https://infopigula.pl) every day, accumulates them in a local
//! JSON store, and once a week mails the whole collection as one HTML digest
//! before emptying the store.
//!
//! ## Usage
//!
//! ```sh
//! SRC_MAIL=me@example.com SRC_PWD=app-password DST_MAIL=you@example.com \
//!     infopigula_digest --daily-at 10:00 --weekly-day saturday --weekly-at 12:00
//! ```
//!
//! ## Architecture
//!
//! 1. **Startup**: load configuration and the article store, then run one
//!    collection pass immediately
//! 2. **Daily collection**: scrape both sections and append new articles
//! 3. **Weekly digest**: compose the stored articles, send them, clear the
//!    store only once the send succeeded
//! 4. **Shutdown**: Ctrl-C stops the loop between jobs; store writes are atomic

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, fmt as tfmt, prelude::*};

mod cli;
mod config;
mod errors;
mod fetch;
mod mailer;
mod models;
mod outputs;
mod pipeline;
mod scheduler;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use config::AppConfig;
use fetch::{ConfiguredFetcher, RetryFetch};
use mailer::SmtpMailer;
use pipeline::PipelineContext;
use scheduler::Scheduler;
use scrapers::Scraper;
use store::ArticleStore;
use utils::{dotenv_problem, ensure_writable_parent};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse CLI (after .env so its values act as environment defaults)
    let dotenv = dotenvy::dotenv();
    let args = Cli::parse();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tfmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(UtcTime::rfc_3339()),
        )
        .with(file_layer)
        .init();

    info!("infopigula_digest starting up. To stop, press Ctrl+C.");
    if let Some(e) = dotenv_problem(&dotenv) {
        warn!(error = %e, "Could not load .env; continuing with the process environment");
    }
    debug!(?args.data_file, ?args.browser, ?args.config, "Parsed CLI arguments");

    let config = AppConfig::from_cli(args)?;

    // Early check: the store file must be writable
    if let Err(e) = ensure_writable_parent(&config.data_file).await {
        error!(
            path = %config.data_file.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let store = ArticleStore::load(&config.data_file).await;

    let fetcher = RetryFetch::new(
        ConfiguredFetcher::from_kind(&config.browser, &config.user_agent)?,
        config.page_attempts,
        StdDuration::from_secs(1),
    );
    info!(browser = ?config.browser, attempts = config.page_attempts, "Page fetcher ready");
    let scraper = Scraper::new(fetcher, config.source_url.clone());

    let mailer = SmtpMailer::new(config.mail.clone());
    let ctx = PipelineContext::new(
        store,
        scraper,
        mailer,
        config.mail.recipient.clone(),
        config.empty_digest,
        config.send_retry,
    );

    let scheduler = Scheduler::new(&config.schedule, Local::now().naive_local());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for Ctrl+C; running until killed");
            std::future::pending::<()>().await;
        }
    };

    let ctx = scheduler.run(ctx, shutdown).await;
    info!(
        pending_articles = ctx.store.len(),
        pending_digest = ctx.pending_digest(),
        "Scheduler stopped by user"
    );
    Ok(())
}
