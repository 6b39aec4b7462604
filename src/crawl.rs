//! The incremental crawl: listing → new articles → store.
//!
//! A run goes through these steps, strictly one after another:
//!
//! 1. Load the store and collect the URLs it already holds
//! 2. Fetch and parse the listing page, keep the first `limit` stubs
//! 3. For each stub: skip it if known, otherwise fetch and parse the article
//!    and pause for the configured delay
//! 4. Save `existing ++ new` if anything new was fetched
//!
//! Failing to load the store or to fetch the listing aborts the run. A
//! failing article does not: it becomes an [`ArticleOutcome::Failed`] and the
//! loop moves on.

use crate::config::CrawlConfig;
use crate::http::{FetchError, FetchPage, fetch_html};
use crate::models::{ArticleRecord, ArticleStub};
use crate::scrapers::habr::{parse_article, parse_listing};
use crate::store::{ArticleStore, StoreError};
use crate::utils::{single_line, truncate_for_log};
use std::collections::HashSet;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to fetch listing page: {0}")]
    Listing(#[source] FetchError),
}

/// Result of processing one listing entry that was not already stored.
#[derive(Debug)]
pub enum ArticleOutcome {
    Fetched(ArticleRecord),
    Failed { url: String, error: FetchError },
}

/// What a run did.
#[derive(Debug, Default)]
pub struct CrawlSummary {
    /// Listing entries looked at (at most `limit`).
    pub considered: usize,
    /// Entries whose URL was already known.
    pub skipped: usize,
    /// Records appended to the store.
    pub added: usize,
    /// Entries that could not be fetched, with the reason.
    pub failures: Vec<(String, String)>,
}

pub struct Crawler<F, S> {
    config: CrawlConfig,
    fetcher: F,
    store: S,
}

impl<F, S> Crawler<F, S>
where
    F: FetchPage,
    S: ArticleStore,
{
    pub fn new(config: CrawlConfig, fetcher: F, store: S) -> Self {
        Self {
            config,
            fetcher,
            store,
        }
    }

    /// Execute one incremental crawl.
    #[instrument(level = "info", skip_all, fields(listing = %self.config.listing_url, limit = self.config.limit))]
    pub async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let existing = self.store.load().await?;
        let mut known: HashSet<String> = existing.iter().map(|r| r.url.clone()).collect();
        debug!(known = known.len(), "Collected stored URLs");

        let listing_html = fetch_html(&self.fetcher, self.config.listing_url.as_str())
            .await
            .map_err(CrawlError::Listing)?;
        let candidates = parse_listing(&listing_html, &self.config.origin)
            .into_iter()
            .take(self.config.limit)
            .collect::<Vec<_>>();
        info!(count = candidates.len(), "Indexed listing page");

        let mut summary = CrawlSummary {
            considered: candidates.len(),
            ..CrawlSummary::default()
        };
        let mut new_articles = Vec::new();

        for stub in candidates {
            if known.contains(&stub.url) {
                info!(title = %stub.title, "⏩ Skipped (already stored)");
                summary.skipped += 1;
                continue;
            }

            info!(title = %stub.title, url = %stub.url, "📥 Fetching article");
            match self.process(stub).await {
                ArticleOutcome::Fetched(record) => {
                    known.insert(record.url.clone());
                    new_articles.push(record);
                }
                ArticleOutcome::Failed { url, error } => {
                    error!(%url, error = %error, "❌ Failed to process article");
                    summary.failures.push((url, error.to_string()));
                }
            }

            sleep(self.config.delay).await;
        }

        summary.added = new_articles.len();
        if new_articles.is_empty() {
            info!("📭 No new articles");
        } else {
            let mut all = existing;
            all.extend(new_articles);
            self.store.save(&all).await?;
            info!(added = summary.added, total = all.len(), "✅ Added new articles");
        }

        Ok(summary)
    }

    /// Fetch and parse a single article.
    #[instrument(level = "info", skip_all, fields(url = %stub.url))]
    pub async fn process(&self, stub: ArticleStub) -> ArticleOutcome {
        match fetch_html(&self.fetcher, &stub.url).await {
            Ok(html) => {
                let page = parse_article(&html);
                debug!(
                    preview = %truncate_for_log(&single_line(&page.text), 120),
                    likes = %page.likes,
                    comments = %page.comments,
                    "Parsed article"
                );
                ArticleOutcome::Fetched(ArticleRecord::from_parts(stub, page))
            }
            Err(error) => ArticleOutcome::Failed {
                url: stub.url,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const LISTING_URL: &str = "https://habr.com/ru/all/";

    fn url(id: &str) -> String {
        format!("https://habr.com/ru/articles/{id}/")
    }

    fn listing(ids: &[&str]) -> String {
        let cards = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<article><h2 class="tm-title"><a href="/ru/articles/{id}/"><span>Статья {id}</span></a></h2></article>"#
                )
            })
            .collect::<String>();
        format!("<html><body>{cards}</body></html>")
    }

    fn article(id: &str) -> String {
        format!(
            r#"<div class="article-formatted-body"><p>Текст {id}</p></div>
               <span data-test-id="votes-meter-counter">+{id}</span>
               <span data-test-id="comments-counter">{id}</span>"#
        )
    }

    fn stored(id: &str) -> ArticleRecord {
        ArticleRecord {
            title: format!("Статья {id}"),
            url: url(id),
            text: format!("Текст {id}"),
            likes: format!("+{id}"),
            comments: id.to_string(),
            extra: Default::default(),
        }
    }

    /// Serves canned pages; unknown URLs answer 404.
    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, Result<String, StatusCode>>,
        unreachable: HashSet<String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn with_listing(ids: &[&str]) -> Self {
            let mut site = Self::default();
            site.pages.insert(LISTING_URL.to_string(), Ok(listing(ids)));
            for id in ids {
                site.pages.insert(url(id), Ok(article(id)));
            }
            site
        }

        fn failing(mut self, id: &str, status: StatusCode) -> Self {
            self.pages.insert(url(id), Err(status));
            self
        }

        fn unreachable(mut self, id: &str) -> Self {
            self.unreachable.insert(url(id));
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl FetchPage for FakeSite {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.unreachable.contains(url) {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    source: refused_connection().await,
                });
            }
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                    retry_after: None,
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: StatusCode::NOT_FOUND,
                    retry_after: None,
                }),
            }
        }
    }

    /// A real connection error: GET against a loopback port nobody listens on.
    async fn refused_connection() -> reqwest::Error {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap_err()
    }

    /// In-memory store that counts saves.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<ArticleRecord>>,
        saves: Mutex<usize>,
    }

    impl MemoryStore {
        fn with(records: Vec<ArticleRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                saves: Mutex::new(0),
            }
        }

        fn records(&self) -> Vec<ArticleRecord> {
            self.records.lock().unwrap().clone()
        }

        fn saves(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    impl ArticleStore for MemoryStore {
        async fn load(&self) -> Result<Vec<ArticleRecord>, StoreError> {
            Ok(self.records())
        }

        async fn save(&self, records: &[ArticleRecord]) -> Result<(), StoreError> {
            *self.records.lock().unwrap() = records.to_vec();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn config(limit: usize) -> CrawlConfig {
        CrawlConfig {
            delay: Duration::ZERO,
            ..CrawlConfig::default()
        }
        .with_limit(limit)
    }

    #[tokio::test]
    async fn test_known_urls_are_not_refetched() {
        let site = FakeSite::with_listing(&["1", "3", "4"]);
        let store = MemoryStore::with(vec![stored("1"), stored("2")]);
        let crawler = Crawler::new(config(3), site, store);

        let summary = crawler.run().await.unwrap();

        assert_eq!(
            crawler.fetcher.requests(),
            vec![LISTING_URL.to_string(), url("3"), url("4")]
        );
        assert_eq!(
            crawler.store.records(),
            vec![stored("1"), stored("2"), stored("3"), stored("4")]
        );
        assert_eq!(summary.considered, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.added, 2);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn test_article_error_status_does_not_block_others() {
        let site =
            FakeSite::with_listing(&["3", "4"]).failing("3", StatusCode::SERVICE_UNAVAILABLE);
        let crawler = Crawler::new(config(5), site, MemoryStore::default());

        let summary = crawler.run().await.unwrap();

        assert_eq!(crawler.store.records(), vec![stored("4")]);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, url("3"));
        assert!(summary.failures[0].1.contains(&url("3")));
    }

    #[tokio::test]
    async fn test_network_error_does_not_block_others() {
        let site = FakeSite::with_listing(&["3", "4"]).unreachable("3");
        let crawler = Crawler::new(config(5), site, MemoryStore::default());

        let summary = crawler.run().await.unwrap();

        assert_eq!(
            crawler.fetcher.requests(),
            vec![LISTING_URL.to_string(), url("3"), url("4")]
        );
        assert_eq!(crawler.store.records(), vec![stored("4")]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, url("3"));
        assert!(summary.failures[0].1.contains(&url("3")));
    }

    #[tokio::test]
    async fn test_limit_caps_candidates() {
        let site = FakeSite::with_listing(&["1", "2", "3", "4", "5", "6", "7"]);
        let crawler = Crawler::new(config(2), site, MemoryStore::default());

        let summary = crawler.run().await.unwrap();

        assert_eq!(summary.considered, 2);
        assert_eq!(crawler.store.records(), vec![stored("1"), stored("2")]);
    }

    #[tokio::test]
    async fn test_nothing_new_skips_save() {
        let site = FakeSite::with_listing(&["1", "2"]);
        let store = MemoryStore::with(vec![stored("1"), stored("2")]);
        let crawler = Crawler::new(config(5), site, store);

        let summary = crawler.run().await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.added, 0);
        assert_eq!(crawler.store.saves(), 0);
        assert_eq!(crawler.fetcher.requests(), vec![LISTING_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_all_failures_skip_save() {
        let site = FakeSite::with_listing(&["1"]).failing("1", StatusCode::NOT_FOUND);
        let crawler = Crawler::new(config(5), site, MemoryStore::default());

        let summary = crawler.run().await.unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(crawler.store.saves(), 0);
    }

    #[tokio::test]
    async fn test_repeated_listing_url_fetched_once() {
        let site = FakeSite::with_listing(&["1", "1"]);
        let crawler = Crawler::new(config(5), site, MemoryStore::default());

        let summary = crawler.run().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(crawler.store.records(), vec![stored("1")]);
        assert_eq!(
            crawler.fetcher.requests(),
            vec![LISTING_URL.to_string(), url("1")]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let site = FakeSite::default();
        let crawler = Crawler::new(config(5), site, MemoryStore::default());

        let err = crawler.run().await.unwrap_err();
        assert!(matches!(err, CrawlError::Listing(_)));
        assert_eq!(crawler.store.saves(), 0);
    }

    #[tokio::test]
    async fn test_fresh_store_file_is_created() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("articles.json");
        let site = FakeSite::with_listing(&["10", "11"]);
        let crawler = Crawler::new(config(5), site, JsonFileStore::new(&path));

        let summary = crawler.run().await.unwrap();

        assert_eq!(summary.added, 2);
        let saved: Vec<ArticleRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, vec![stored("10"), stored("11")]);
    }

    #[tokio::test]
    async fn test_store_untouched_when_nothing_new() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("articles.json");
        let site = FakeSite::with_listing(&["1"]).failing("1", StatusCode::BAD_GATEWAY);
        let crawler = Crawler::new(config(5), site, JsonFileStore::new(&path));

        crawler.run().await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_store_aborts_before_network() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("articles.json");
        std::fs::write(&path, "not json").unwrap();
        let site = FakeSite::with_listing(&["1"]);
        let crawler = Crawler::new(config(5), site, JsonFileStore::new(&path));

        let err = crawler.run().await.unwrap_err();

        assert!(matches!(err, CrawlError::Store(StoreError::Corrupt { .. })));
        assert!(crawler.fetcher.requests().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    #[tokio::test]
    async fn test_process_returns_tagged_outcome() {
        let site = FakeSite::with_listing(&["7"]);
        let crawler = Crawler::new(config(5), site, MemoryStore::default());

        let ok = crawler
            .process(ArticleStub {
                title: "Статья 7".to_string(),
                url: url("7"),
            })
            .await;
        assert!(matches!(ok, ArticleOutcome::Fetched(ref r) if *r == stored("7")));

        let missing = crawler
            .process(ArticleStub {
                title: "Нет".to_string(),
                url: url("404"),
            })
            .await;
        assert!(matches!(missing, ArticleOutcome::Failed { ref url, .. } if url.ends_with("/404/")));
    }
}
