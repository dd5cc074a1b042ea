//! HTML collaborator for link extraction
//!
//! Finds every link-bearing attribute in a document, in document order, and
//! absolutizes it against the page's URL. Links are not filtered by scheme or
//! attribute; fetchability is decided later by the frontier's policy.

use crate::url::resolve;
use scraper::{Html, Selector};

/// Elements whose attributes reference other resources
const LINK_SELECTOR: &str = "a[href], area[href], link[href], img[src], script[src], \
                             iframe[src], frame[src], embed[src], source[src], form[action]";

/// Attributes read from a matched element, first present wins
const LINK_ATTRIBUTES: [&str; 3] = ["href", "src", "action"];

/// Turns fetched content into a lazy sequence of absolute links
///
/// The sequence is finite and consumed once.
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, content: &[u8], base_url: &str) -> Box<dyn Iterator<Item = String> + Send>;
}

/// `LinkExtractor` backed by scraper's HTML5 parser
#[derive(Debug, Clone)]
pub struct HtmlLinkExtractor {
    selector: Option<Selector>,
}

impl HtmlLinkExtractor {
    pub fn new() -> Self {
        Self {
            selector: Selector::parse(LINK_SELECTOR).ok(),
        }
    }

    /// Returns the raw (unresolved) link values of a document, in order
    pub fn raw_links(&self, html: &str) -> Vec<String> {
        let Some(selector) = &self.selector else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        document
            .select(selector)
            .filter_map(|element| {
                LINK_ATTRIBUTES
                    .iter()
                    .find_map(|attr| element.value().attr(attr))
            })
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

impl Default for HtmlLinkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    fn extract(&self, content: &[u8], base_url: &str) -> Box<dyn Iterator<Item = String> + Send> {
        // The parsed DOM is not Send; only the attribute strings leave this call.
        let html = String::from_utf8_lossy(content);
        let raw = self.raw_links(&html);
        let base = base_url.to_string();

        Box::new(raw.into_iter().filter_map(move |href| {
            match resolve(&base, &href) {
                Ok(absolute) => Some(absolute),
                Err(e) => {
                    tracing::debug!("Skipping unresolvable link: {}", e);
                    None
                }
            }
        }))
    }
}
