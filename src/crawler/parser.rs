//! HTML extractor
//!
//! Pulls these out of a fetched document:
//! - the title (text of the first `<title>`)
//! - the `<meta name="description">` content
//! - coarse content text (first text child of every `<p>`, `<h1>`, `<h2>`)
//! - the raw `href` and anchor text of every `<a>`, unresolved and unfiltered
//!
//! Resolution and scheme filtering happen in [`crate::url::resolve_link`].

use scraper::{ElementRef, Html, Node};
use sha2::{Digest, Sha256};

/// An `<a href>` as it appears in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub href: String,

    /// All text inside the element, whitespace collapsed
    pub anchor_text: String,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Text of the first `<title>`, or empty
    pub title: String,

    /// Content of the first `<meta name="description">`, or empty
    pub description: String,

    /// Space-separated heading and paragraph text, or empty
    pub content: String,

    /// Links in document order
    pub links: Vec<RawLink>,
}

/// Elements whose leading text counts as page content
const CONTENT_ELEMENTS: [&str; 3] = ["p", "h1", "h2"];

/// Parses HTML content and extracts title, description, content and links
///
/// Parsing never fails: the HTML5 parser recovers from malformed markup, and
/// a document with nothing recognisable yields an empty [`ParsedPage`].
///
/// Only the first child of a content element is considered, and only when
/// it is text. `<p><em>a</em> b</p>` contributes nothing.
///
/// # Example
///
/// ```
/// use skein::crawler::parse_document;
///
/// let html = r#"<html><head><title>Test</title></head>
///     <body><h1>Hello</h1><a href="/page">Link</a></body></html>"#;
/// let parsed = parse_document(html);
/// assert_eq!(parsed.title, "Test");
/// assert_eq!(parsed.content, "Hello");
/// assert_eq!(parsed.links[0].href, "/page");
/// assert_eq!(parsed.links[0].anchor_text, "Link");
/// ```
pub fn parse_document(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    if !document.errors.is_empty() {
        tracing::trace!("Recovered from {} parse errors", document.errors.len());
    }

    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut content: Vec<String> = Vec::new();
    let mut links = Vec::new();

    // Pre-order walk over the tree, no recursion
    for node in document.tree.root().descendants() {
        let Node::Element(element) = node.value() else {
            continue;
        };

        match element.name() {
            "title" if title.is_none() => {
                let text = first_text(node.first_child().map(|c| c.value()));
                title = Some(text.unwrap_or_default());
            }
            "meta" if description.is_none() => {
                let is_description = element
                    .attr("name")
                    .is_some_and(|name| name.eq_ignore_ascii_case("description"));
                if is_description {
                    description = element.attr("content").map(|c| c.trim().to_string());
                }
            }
            "a" => {
                if let Some(href) = element.attr("href") {
                    let anchor_text = ElementRef::wrap(node)
                        .map(|a| collapse_whitespace(a.text()))
                        .unwrap_or_default();
                    links.push(RawLink {
                        href: href.to_string(),
                        anchor_text,
                    });
                }
            }
            name if CONTENT_ELEMENTS.contains(&name) => {
                if let Some(text) = first_text(node.first_child().map(|c| c.value()))
                    .filter(|t| !t.is_empty())
                {
                    content.push(text);
                }
            }
            _ => {}
        }
    }

    ParsedPage {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
        content: content.join(" "),
        links,
    }
}

/// Hex SHA-256 of extracted page content
///
/// Pages with identical content share a hash, which is how mirrors and
/// duplicates are found after a crawl.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Trimmed text of a first child, if that child is a text node
fn first_text(child: Option<&Node>) -> Option<String> {
    match child? {
        Node::Text(text) => Some(text.trim().to_string()),
        _ => None,
    }
}

fn collapse_whitespace<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
