//! Pure DOM-querying extraction heuristics.
//!
//! `extract` produces a [`PageSnapshot`] from a parsed page. It runs
//! entirely synchronously, never touches the network, never mutates the
//! document, and never fails: every branch degrades to a sentinel string
//! or an empty collection.

pub mod attributes;
pub mod fields;
pub mod job;
pub mod scan;

use scraper::Selector;

use crate::page::Page;
use crate::snapshot::PageSnapshot;

/// Full extraction pass over one page.
pub fn extract(page: &Page) -> PageSnapshot {
    let full_text = page.full_text();
    let mut snapshot = scan::scan_page(page, &full_text);
    snapshot.job_description = job::job_description(page);
    snapshot.form_fields = fields::extract_form_fields(page);
    snapshot.job = attributes::job_attributes(page, &full_text);
    snapshot
}

/// Parse a selector that is a compile-time constant.
pub(crate) fn static_selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Parse a selector built from page data; attribute values can contain
/// characters the parser rejects, in which case the cascade step is
/// skipped rather than aborting extraction.
pub(crate) fn dynamic_selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Quote an attribute value for embedding in a selector. Values carrying
/// quote or backslash characters are not representable; callers skip them.
pub(crate) fn css_quote(value: &str) -> Option<String> {
    if value.contains('"') || value.contains('\\') {
        return None;
    }
    Some(format!("\"{}\"", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    #[test]
    fn test_css_quote_rejects_quotes() {
        assert_eq!(css_quote("email"), Some("\"email\"".to_string()));
        assert!(css_quote("a\"b").is_none());
        assert!(css_quote("a\\b").is_none());
    }

    #[test]
    fn test_extract_never_fails_on_empty_document() {
        let page = Page::parse("", None);
        let snapshot = extract(&page);
        assert_eq!(
            snapshot.job_description,
            job::JOB_DESCRIPTION_SENTINEL
        );
        assert!(snapshot.form_fields.is_empty());
        assert!(snapshot.headings.is_empty());
    }
}
