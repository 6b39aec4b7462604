//! # Habr Harvest
//!
//! Incrementally scrapes the Habr article listing into a local JSON file.
//!
//! Each run fetches the listing page, looks at the first few articles, and
//! downloads only the ones not already in the store: their body text, vote
//! count and comment count. New records are appended and the store is
//! rewritten once at the end.
//!
//! ## Usage
//!
//! ```sh
//! habr_harvest        # first 5 listing entries
//! habr_harvest 20     # first 20
//! ```
//!
//! ## Architecture
//!
//! 1. **Indexing**: fetch the listing page and extract article stubs
//! 2. **Fetching**: download each unseen article, one at a time, with a pause
//! 3. **Output**: append new records to `articles.json`

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod crawl;
mod http;
mod models;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use config::CrawlConfig;
use crawl::Crawler;
use store::JsonFileStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("habr_harvest starting up");

    let args = Cli::parse();
    debug!(limit = args.limit, "Parsed CLI arguments");

    let config = match CrawlConfig::from_env() {
        Ok(config) => config.with_limit(args.limit),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        listing = %config.listing_url,
        limit = config.limit,
        delay_ms = config.delay.as_millis(),
        "Configuration loaded"
    );

    let session = http::make_session()?;
    let store = JsonFileStore::new(config.store_path.clone());
    info!(path = %store.path().display(), "Using article store");
    let crawler = Crawler::new(config, session, store);

    let summary = match crawler.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Crawl aborted");
            return Err(e.into());
        }
    };

    for (url, reason) in &summary.failures {
        warn!(%url, %reason, "Article was not stored");
    }

    let elapsed = start_time.elapsed();
    info!(
        considered = summary.considered,
        skipped = summary.skipped,
        added = summary.added,
        failed = summary.failures.len(),
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
