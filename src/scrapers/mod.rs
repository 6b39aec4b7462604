//! HTML extraction for the scraped site.
//!
//! Scraping follows a two-phase pattern:
//!
//! 1. **Indexing**: pull article stubs out of the listing page
//! 2. **Fetching**: pull text and counters out of each article page
//!
//! Both phases are pure functions over markup; the network lives in
//! [`crate::http`] and the orchestration in [`crate::crawl`].
//!
//! This module also hosts [`FallbackSelector`], a typed replacement for the
//! "try this selector, else that one, else a default" pattern that counters
//! on article pages need.

pub mod habr;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

/// A CSS selector that failed to compile.
#[derive(Debug, Error)]
#[error("invalid selector `{css}`: {reason}")]
pub struct InvalidSelector {
    pub css: String,
    pub reason: String,
}

/// One step of a [`FallbackSelector`] chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorRule {
    /// `tag[attr="value"]`, an exact attribute match.
    AttrEquals {
        tag: &'static str,
        attr: &'static str,
        value: &'static str,
    },
    /// `tag[class*="needle"]`, a substring match on the raw class attribute.
    ClassContains {
        tag: &'static str,
        needle: &'static str,
    },
}

impl SelectorRule {
    /// Render the rule as a CSS selector.
    pub fn to_css(&self) -> String {
        match self {
            SelectorRule::AttrEquals { tag, attr, value } => format!(r#"{tag}[{attr}="{value}"]"#),
            SelectorRule::ClassContains { tag, needle } => format!(r#"{tag}[class*="{needle}"]"#),
        }
    }

    fn compile(&self) -> Result<Selector, InvalidSelector> {
        let css = self.to_css();
        let parsed = Selector::parse(&css).map_err(|e| e.to_string());
        parsed.map_err(|reason| InvalidSelector { css, reason })
    }
}

/// Ordered selector rules with a literal default.
///
/// The first rule that matches any element wins and that element's trimmed
/// text is returned, even when the text is empty. Later rules are not
/// consulted once an earlier one matched.
#[derive(Debug)]
pub struct FallbackSelector {
    name: &'static str,
    rules: Vec<(SelectorRule, Selector)>,
    default: &'static str,
}

impl FallbackSelector {
    pub fn new(
        name: &'static str,
        rules: Vec<SelectorRule>,
        default: &'static str,
    ) -> Result<Self, InvalidSelector> {
        let rules = rules
            .into_iter()
            .map(|rule| rule.compile().map(|selector| (rule, selector)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name,
            rules,
            default,
        })
    }

    /// Evaluate the chain against a parsed document.
    pub fn extract(&self, document: &Html) -> String {
        for (tier, (rule, selector)) in self.rules.iter().enumerate() {
            if let Some(element) = document.select(selector).next() {
                debug!(selector = self.name, tier, rule = %rule.to_css(), "Selector matched");
                return element.text().collect::<String>().trim().to_string();
            }
        }
        debug!(selector = self.name, default = self.default, "No selector matched; using default");
        self.default.to_string()
    }
}
