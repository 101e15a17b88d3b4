//! Reference extraction from HTML documents
//!
//! Collects the raw attribute values that point at other resources. Values
//! are returned exactly as written in the document; resolving and
//! canonicalizing them is the caller's job.

use std::sync::LazyLock;

use scraper::{Html, Selector};

/// Elements and the attribute on each that names another resource
const REFERENCE_ATTRIBUTES: [(&str, &str); 4] = [
    ("img[src]", "src"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("a[href]", "href"),
];

static SELECTORS: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    REFERENCE_ATTRIBUTES
        .iter()
        .map(|(css, attr)| {
            let selector = Selector::parse(css).expect("reference selectors are valid");
            (selector, *attr)
        })
        .collect()
});

/// Every `img[src]`, `link[href]`, `script[src]` and `a[href]` value in `html`
///
/// Duplicates are kept; the dedup set collapses them later.
pub fn extract_references(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    SELECTORS
        .iter()
        .flat_map(|(selector, attr)| {
            document
                .select(selector)
                .filter_map(move |element| element.value().attr(attr))
        })
        .map(str::to_string)
        .collect()
}

/// Like [`extract_references`] but for raw bytes of unknown encoding
pub fn extract_references_from_bytes(body: &[u8]) -> Vec<String> {
    extract_references(&String::from_utf8_lossy(body))
}
