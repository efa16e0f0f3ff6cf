//! Job-description resolution: an ordered fallback chain, cheap and
//! specific signals before expensive, noisy ones. First match wins and
//! the order is load-bearing; see the tests at the bottom.

use crate::page::{element_text, Page};
use crate::util::truncate_chars;

use super::{dynamic_selector, static_selector};

/// Returned when every fallback comes up empty.
pub const JOB_DESCRIPTION_SENTINEL: &str = "Could not extract job description from this page.";

/// Known job-description containers, most specific first: site-specific
/// selectors (LinkedIn, Indeed, Greenhouse), then generic class and
/// attribute patterns.
const CONTAINER_SELECTORS: &[&str] = &[
    ".description__text",
    "#job-details",
    ".job-description",
    "#jobDescriptionText",
    ".jobsearch-jobDescriptionText",
    ".content-wrapper",
    "#content",
    r#"[data-automation="jobDescription"]"#,
    r#"[data-testid="job-description"]"#,
    ".job-view-layout",
    r#"[class*="job-desc"]"#,
    r#"[class*="description"]"#,
    r#"[class*="job-details"]"#,
];

/// Keywords that mark an element as likely belonging to a job posting.
const JOB_KEYWORDS: &[&str] = &[
    "requirements",
    "qualifications",
    "responsibilities",
    "what youll do",
    "what you will do",
    "about this role",
    "job summary",
    "position summary",
];

const MIN_CONTAINER_CHARS: usize = 100;
const MIN_KEYWORD_COMBINED_CHARS: usize = 200;
const MIN_MAIN_CONTENT_CHARS: usize = 300;
const MAX_BODY_FALLBACK_CHARS: usize = 10_000;

/// Resolve the job description for a page. Never fails; the worst case is
/// the fixed sentinel string.
pub fn job_description(page: &Page) -> String {
    // 1. Known containers, first sufficiently long match wins.
    for css in CONTAINER_SELECTORS {
        let Some(selector) = dynamic_selector(css) else {
            continue;
        };
        if let Some(element) = page.document().select(&selector).next() {
            let text = element_text(element).trim().to_string();
            if text.chars().count() > MIN_CONTAINER_CHARS {
                tracing::debug!(selector = css, "job description found by container");
                return text;
            }
        }
    }

    // 2. Keyword scan over generic content elements.
    let candidates = static_selector("p, div, section, article");
    let mut combined = String::new();
    for element in page.document().select(&candidates) {
        let text = element_text(element);
        let trimmed = text.trim();
        if trimmed.chars().count() <= MIN_CONTAINER_CHARS {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if JOB_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            combined.push_str(trimmed);
            combined.push_str("\n\n");
        }
    }
    if combined.chars().count() > MIN_KEYWORD_COMBINED_CHARS {
        tracing::debug!("job description found by keyword scan");
        return combined;
    }

    // 3. Main content region.
    for css in ["main", "article"] {
        let selector = static_selector(css);
        if let Some(element) = page.document().select(&selector).next() {
            let text = element_text(element).trim().to_string();
            if text.chars().count() > MIN_MAIN_CONTENT_CHARS {
                tracing::debug!(selector = css, "using main content as job description");
                return text;
            }
        }
    }

    // 4. Body text, hard-truncated.
    let body = static_selector("body");
    if let Some(element) = page.document().select(&body).next() {
        let text = element_text(element).trim().to_string();
        if !text.is_empty() {
            return truncate_chars(&text, MAX_BODY_FALLBACK_CHARS);
        }
    }

    JOB_DESCRIPTION_SENTINEL.to_string()
}
