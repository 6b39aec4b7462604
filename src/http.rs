//! HTTP fetching with a bounded exponential-backoff retry policy.
//!
//! The module is organised around one small trait so the crawl loop can be
//! driven by a real client or by a scripted fake in tests:
//! - [`FetchPage`]: GET a URL and return the body as text
//! - [`HttpFetcher`]: `reqwest`-backed implementation with browser-like headers
//! - [`RetryFetch`]: decorator adding retries to any [`FetchPage`]
//!
//! # Retry Strategy
//!
//! - At most 3 retries after the initial attempt
//! - Only for statuses 429, 500, 502, 503, 504 and for connect/timeout failures
//! - Exponential backoff starting at 0.5 seconds (0.5s, 1s, 2s), capped at 120s
//! - `Retry-After: <seconds>` on a 429 or 503 replaces the computed delay
//!
//! Only GET is ever issued, so every retried request is idempotent.

use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Browser-like User-Agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36";

/// Preferred response language.
pub const ACCEPT_LANGUAGE_VALUE: &str = "ru,en;q=0.9";

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Statuses that are worth another attempt.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors produced while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The server answered with a 4xx or 5xx status.
    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: StatusCode,
        retry_after: Option<Duration>,
    },

    /// The request never produced a usable response.
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Whether the retry policy should try again after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => RETRY_STATUSES.contains(&status.as_u16()),
            FetchError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            FetchError::Client(_) => false,
        }
    }

    /// Server-requested delay; honoured for 429 and 503 only.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Status {
                status,
                retry_after,
                ..
            } if matches!(status.as_u16(), 429 | 503) => *retry_after,
            _ => None,
        }
    }
}

/// Something that can GET a URL and hand back the body as text.
pub trait FetchPage {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Build the shared `reqwest` client.
///
/// Sends a desktop Chrome User-Agent and prefers Russian content, which is
/// what the listing page is served in.
pub fn make_client() -> Result<Client, FetchError> {
    client_builder().build().map_err(FetchError::Client)
}

fn client_builder() -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
    );

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
}

/// Build the client used by the crawler: an [`HttpFetcher`] wrapped in the
/// default [`RetryPolicy`].
pub fn make_session() -> Result<RetryFetch<HttpFetcher>, FetchError> {
    let fetcher = HttpFetcher::new(make_client()?);
    Ok(RetryFetch::new(fetcher, RetryPolicy::default()))
}

/// Parse a `Retry-After` header given in delta-seconds.
///
/// HTTP-date values are ignored and fall back to the computed backoff.
pub fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// [`FetchPage`] implementation over a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl FetchPage for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let retry_after = response.headers().get(RETRY_AFTER).and_then(parse_retry_after);
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
                retry_after,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = body.len(), %status, "Fetched page");
        Ok(body)
    }
}

/// Retry tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles with each further retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based) after `err`.
    pub fn delay_for(&self, retry: usize, err: &FetchError) -> Duration {
        let delay = err.retry_after().unwrap_or_else(|| {
            let exp = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX);
            self.base_delay.saturating_mul(2u32.saturating_pow(exp))
        });
        delay.min(self.max_delay)
    }
}

/// Decorator that retries transient failures of the wrapped [`FetchPage`].
///
/// Non-retryable errors (a 404, a malformed URL) are returned immediately.
pub struct RetryFetch<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryFetch<T>
where
    T: FetchPage,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.policy.max_retries)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl<T> FetchPage for RetryFetch<T>
where
    T: FetchPage,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut retry = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    retry += 1;
                    if retry > self.policy.max_retries {
                        error!(
                            retries = self.policy.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.delay_for(retry, &e);
                    warn!(
                        retry,
                        max = self.policy.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Fetch a page and log how long it took.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_html<F: FetchPage>(fetcher: &F, url: &str) -> Result<String, FetchError> {
    let t0 = Instant::now();
    let res = fetcher.fetch(url).await;
    let dt = t0.elapsed();

    match &res {
        Ok(body) => info!(elapsed_ms = dt.as_millis(), bytes = body.len(), "fetch_html succeeded"),
        Err(e) => warn!(elapsed_ms = dt.as_millis(), error = %e, "fetch_html failed"),
    }
    res
}
