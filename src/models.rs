//! Data models for scraped articles.
//!
//! - [`ArticleStub`]: a listing-page entry, known before the article is fetched
//! - [`ArticlePage`]: what the article extractor pulls out of a single page
//! - [`ArticleRecord`]: the persisted unit written to the JSON store
//!
//! Likes and comments are kept exactly as the site renders them (`"1.2K"`,
//! `"+15"`), never parsed into numbers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A `(title, url)` pair discovered on the listing page.
///
/// The `url` is always absolute; relative links are resolved against the
/// configured origin during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleStub {
    /// The visible headline text.
    pub title: String,
    /// Absolute URL of the article page.
    pub url: String,
}

/// Content extracted from an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticlePage {
    /// Paragraph and list-item text joined with newlines.
    pub text: String,
    /// Vote counter as rendered, `"0"` when absent.
    pub likes: String,
    /// Comment counter as rendered, `"0"` when absent.
    pub comments: String,
}

/// A fully populated article as stored in `articles.json`.
///
/// Field order here is the key order in the serialized JSON. Keys a stored
/// entry carries beyond these five are kept in `extra` and written back
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub text: String,
    pub likes: String,
    pub comments: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArticleRecord {
    /// Assemble a record from the listing stub and the parsed page.
    pub fn from_parts(stub: ArticleStub, page: ArticlePage) -> Self {
        Self {
            title: stub.title,
            url: stub.url,
            text: page.text,
            likes: page.likes,
            comments: page.comments,
            extra: Map::new(),
        }
    }
}
