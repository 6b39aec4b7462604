//! Command-line interface definitions.
//!
//! The only argument is how many listing entries to look at. Everything else
//! is configured through the environment, see [`crate::config`].

use crate::config::DEFAULT_LIMIT;
use clap::Parser;

/// Fetch new Habr articles into a local JSON store.
///
/// # Examples
///
/// ```sh
/// # Consider the first 5 articles of the listing
/// habr_harvest
///
/// # Consider the first 20
/// habr_harvest 20
///
/// # Store somewhere else, no pause between articles
/// HABR_STORE_PATH=/data/habr.json HABR_DELAY_MS=0 habr_harvest
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Number of listing entries to consider
    #[arg(default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,
}
