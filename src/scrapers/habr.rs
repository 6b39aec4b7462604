//! Habr listing and article page extraction.
//!
//! # Listing page
//!
//! Article headlines are `<a>` elements directly under an `<h2>` somewhere
//! inside an `<article>` card. Links are usually site-relative
//! (`/ru/articles/812345/`) and are resolved against the site origin.
//!
//! # Article page
//!
//! The body lives in one or more `div.article-formatted-body` containers.
//! Vote and comment counters are `<span>`s tagged with `data-test-id`; older
//! layouts only carry a class containing `vote` / `comment`, hence the
//! [`FallbackSelector`] chains.

use crate::models::{ArticlePage, ArticleStub};
use crate::scrapers::{FallbackSelector, SelectorRule};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

/// Scheme and host used to absolutize relative links.
pub const HABR_ORIGIN: &str = "https://habr.com";

static LISTING_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article h2 > a").expect("listing link selector"));

static BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.article-formatted-body").expect("body selector"));

static BODY_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, li").expect("body block selector"));

static LIKES: Lazy<FallbackSelector> = Lazy::new(|| {
    FallbackSelector::new(
        "likes",
        vec![
            SelectorRule::AttrEquals {
                tag: "span",
                attr: "data-test-id",
                value: "votes-meter-counter",
            },
            SelectorRule::ClassContains {
                tag: "span",
                needle: "vote",
            },
        ],
        "0",
    )
    .expect("likes selector chain")
});

static COMMENTS: Lazy<FallbackSelector> = Lazy::new(|| {
    FallbackSelector::new(
        "comments",
        vec![
            SelectorRule::AttrEquals {
                tag: "span",
                attr: "data-test-id",
                value: "comments-counter",
            },
            SelectorRule::ClassContains {
                tag: "span",
                needle: "comment",
            },
        ],
        "0",
    )
    .expect("comments selector chain")
});

/// Resolve a site-relative href (`/path`) against `origin`.
///
/// Anything not starting with `/` is returned untouched.
pub fn absolutize(href: &str, origin: &str) -> String {
    if href.starts_with('/') {
        format!("{}{}", origin.trim_end_matches('/'), href)
    } else {
        href.to_string()
    }
}

/// Extract article stubs from the listing page, in document order.
///
/// Anchors with an empty title or an empty href are dropped. Duplicates are
/// kept; de-duplication happens against the store.
#[instrument(level = "debug", skip(html))]
pub fn parse_listing(html: &str, origin: &str) -> Vec<ArticleStub> {
    let document = Html::parse_document(html);

    let stubs = document
        .select(&LISTING_LINK)
        .filter_map(|anchor| {
            let title = anchor.text().collect::<String>().trim().to_string();
            let href = anchor.value().attr("href").unwrap_or_default().trim();
            if title.is_empty() || href.is_empty() {
                return None;
            }
            Some(ArticleStub {
                title,
                url: absolutize(href, origin),
            })
        })
        .collect::<Vec<_>>();

    debug!(count = stubs.len(), "Parsed listing page");
    stubs
}

/// Extract body text and counters from an article page.
///
/// Never fails: a page without a body yields empty text, and missing
/// counters yield `"0"`.
#[instrument(level = "debug", skip_all)]
pub fn parse_article(html: &str) -> ArticlePage {
    let document = Html::parse_document(html);

    let paragraphs = document
        .select(&BODY)
        .flat_map(|body| body.select(&BODY_BLOCK))
        // Whole element text trimmed once, so inline markup keeps its spacing.
        .map(|block| block.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();

    let page = ArticlePage {
        text: paragraphs.join("\n"),
        likes: LIKES.extract(&document),
        comments: COMMENTS.extract(&document),
    };
    debug!(
        paragraphs = paragraphs.len(),
        likes = %page.likes,
        comments = %page.comments,
        "Parsed article page"
    );
    page
}
