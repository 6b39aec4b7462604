//! Runtime configuration for a crawl.
//!
//! Every value has a built-in default; a few can be overridden through
//! environment variables:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HABR_LISTING_URL` | `https://habr.com/ru/all/` |
//! | `HABR_ORIGIN` | scheme and host of the listing URL |
//! | `HABR_STORE_PATH` | `articles.json` |
//! | `HABR_DELAY_MS` | `1000` |
//!
//! The article limit comes from the command line, see [`crate::cli`].

use crate::scrapers::habr::HABR_ORIGIN;
use crate::store::DEFAULT_STORE_FILE;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Listing page crawled by default.
pub const DEFAULT_LISTING_URL: &str = "https://habr.com/ru/all/";

/// Number of listing entries considered per run.
pub const DEFAULT_LIMIT: usize = 5;

/// Pause after each article fetch.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{var}={value:?} is not a valid number: {source}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Everything the crawler needs to know besides its fetcher and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// The index page listing recent articles.
    pub listing_url: Url,
    /// Prefix for site-relative article links, without a trailing slash.
    pub origin: String,
    /// JSON store location.
    pub store_path: PathBuf,
    /// How many listing entries to consider.
    pub limit: usize,
    /// Sleep after every article fetch attempt.
    pub delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            listing_url: Url::parse(DEFAULT_LISTING_URL).expect("default listing URL is valid"),
            origin: HABR_ORIGIN.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            limit: DEFAULT_LIMIT,
            delay: DEFAULT_DELAY,
        }
    }
}

impl CrawlConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("HABR_LISTING_URL") {
            config.listing_url = Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
                var: "HABR_LISTING_URL",
                value: value.clone(),
                source,
            })?;
            config.origin = config.listing_url.origin().ascii_serialization();
        }

        if let Some(value) = lookup("HABR_ORIGIN") {
            let origin = Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
                var: "HABR_ORIGIN",
                value: value.clone(),
                source,
            })?;
            config.origin = origin.origin().ascii_serialization();
        }

        if let Some(value) = lookup("HABR_STORE_PATH") {
            config.store_path = PathBuf::from(value);
        }

        if let Some(value) = lookup("HABR_DELAY_MS") {
            let ms = value
                .trim()
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidNumber {
                    var: "HABR_DELAY_MS",
                    value: value.clone(),
                    source,
                })?;
            config.delay = Duration::from_millis(ms);
        }

        debug!(?config, "Resolved configuration");
        Ok(config)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
