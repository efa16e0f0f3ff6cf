//! Whole-page structural scan: title, metadata, headings, links, images,
//! forms, clickable elements and main-content sections.

use ego_tree::NodeId;
use scraper::ElementRef;
use std::collections::HashSet;

use crate::page::{element_text, is_visible, Page};
use crate::snapshot::{
    ButtonInfo, FormInfo, Heading, ImageInfo, LinkInfo, PageSnapshot, Section, MAX_HTML_CHARS,
};
use crate::util::{collapse_whitespace, truncate, truncate_chars};

const MAX_LINKS: usize = 100;
const MAX_IMAGES: usize = 50;
const MAX_SECTIONS: usize = 30;
const MIN_SECTION_CHARS: usize = 100;
const LOCATION_MAX_CHARS: usize = 50;

/// Containers treated as main content, tried in order. Falls back to any
/// sufficiently long `<div>` when none match.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "section",
    r#"[role="main"]"#,
    ".main-content",
    ".content",
    ".job-description",
    ".description",
    r#"[id*="content"]"#,
    r#"[id*="description"]"#,
];

/// Phrases that mark a clickable element as an application entry point.
const APPLY_PHRASES: &[&str] = &["apply", "submit application", "easy apply", "quick apply"];

/// Structural scan of one page. Fills everything except the job
/// description, the form-field descriptors and the job attributes, which
/// have dedicated passes.
pub fn scan_page(page: &Page, full_text: &str) -> PageSnapshot {
    let mut snapshot = PageSnapshot {
        title: page_title(page),
        url: page.url_str(),
        full_text: full_text.to_string(),
        truncated_html: truncate_chars(&page.source_html(), MAX_HTML_CHARS),
        ..Default::default()
    };

    collect_metadata(page, &mut snapshot);
    collect_headings(page, &mut snapshot);
    collect_links(page, &mut snapshot);
    collect_images(page, &mut snapshot);
    collect_forms(page, &mut snapshot);
    collect_buttons(page, &mut snapshot);
    collect_sections(page, &mut snapshot);

    snapshot
}

fn page_title(page: &Page) -> String {
    let selector = super::static_selector("title");
    page.document()
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&element_text(el)))
        .unwrap_or_default()
}

fn collect_metadata(page: &Page, snapshot: &mut PageSnapshot) {
    let selector = super::static_selector("meta[name][content], meta[property][content]");
    for meta in page.document().select(&selector) {
        let value = meta.value();
        let key = value
            .attr("name")
            .or_else(|| value.attr("property"))
            .unwrap_or_default();
        let content = value.attr("content").unwrap_or_default();
        if !key.is_empty() && !content.is_empty() {
            snapshot.metadata.insert(key.to_string(), content.to_string());
        }
    }
}

fn collect_headings(page: &Page, snapshot: &mut PageSnapshot) {
    let selector = super::static_selector("h1, h2, h3, h4, h5, h6");
    for heading in page.document().select(&selector) {
        let text = collapse_whitespace(&element_text(heading));
        if text.is_empty() {
            continue;
        }
        let level = heading.value().name().as_bytes()[1] - b'0';
        snapshot.headings.push(Heading { level, text });
    }
}

fn collect_links(page: &Page, snapshot: &mut PageSnapshot) {
    let selector = super::static_selector("a[href]");
    for link in page.document().select(&selector).take(MAX_LINKS) {
        let value = link.value();
        snapshot.links.push(LinkInfo {
            text: collapse_whitespace(&element_text(link)),
            href: value.attr("href").unwrap_or_default().to_string(),
            id: value.attr("id").unwrap_or_default().to_string(),
            classes: value.attr("class").unwrap_or_default().to_string(),
        });
    }
}

fn collect_images(page: &Page, snapshot: &mut PageSnapshot) {
    let selector = super::static_selector("img[src]");
    for image in page.document().select(&selector).take(MAX_IMAGES) {
        let value = image.value();
        snapshot.images.push(ImageInfo {
            alt: value.attr("alt").unwrap_or_default().to_string(),
            src: value.attr("src").unwrap_or_default().to_string(),
            width: value.attr("width").map(str::to_string),
            height: value.attr("height").map(str::to_string),
        });
    }
}

fn collect_forms(page: &Page, snapshot: &mut PageSnapshot) {
    let form_selector = super::static_selector("form");
    let field_selector = super::static_selector("input, textarea, select");
    for form in page.document().select(&form_selector) {
        let value = form.value();
        snapshot.forms.push(FormInfo {
            id: value.attr("id").unwrap_or_default().to_string(),
            name: value.attr("name").unwrap_or_default().to_string(),
            action: value.attr("action").unwrap_or_default().to_string(),
            method: value.attr("method").unwrap_or("get").to_string(),
            num_fields: form.select(&field_selector).count(),
        });
    }
}

fn collect_buttons(page: &Page, snapshot: &mut PageSnapshot) {
    let selector = super::static_selector(
        r#"button, [role="button"], input[type="submit"], input[type="button"], a.btn, a.button"#,
    );
    let mut seen: HashSet<NodeId> = HashSet::new();
    for button in page.document().select(&selector) {
        if !seen.insert(button.id()) {
            continue;
        }
        let info = describe_button(&button);
        let haystack = format!(
            "{} {} {} {}",
            info.text.to_lowercase(),
            info.id.to_lowercase(),
            info.classes.to_lowercase(),
            button
                .value()
                .attr("aria-label")
                .unwrap_or_default()
                .to_lowercase(),
        );
        if APPLY_PHRASES.iter().any(|p| haystack.contains(p)) {
            snapshot.apply_buttons.push(info.clone());
        }
        snapshot.buttons.push(info);
    }
}

fn describe_button(button: &ElementRef<'_>) -> ButtonInfo {
    let value = button.value();
    let kind = match value.name() {
        "a" => "link".to_string(),
        "input" => value.attr("type").unwrap_or("button").to_string(),
        name => value.attr("role").unwrap_or(name).to_string(),
    };
    let text = if value.name() == "input" {
        value.attr("value").unwrap_or_default().to_string()
    } else {
        collapse_whitespace(&element_text(*button))
    };
    ButtonInfo {
        kind,
        text,
        href: value.attr("href").unwrap_or_default().to_string(),
        id: value.attr("id").unwrap_or_default().to_string(),
        classes: value.attr("class").unwrap_or_default().to_string(),
        disabled: value.attr("disabled").is_some(),
        location: button_location(button),
    }
}

/// Nearest enclosing heading text, as a hint for where the button sits.
fn button_location(button: &ElementRef<'_>) -> Option<String> {
    let headings = super::static_selector("h1, h2, h3, h4, h5, h6");
    for ancestor in button.ancestors() {
        let Some(ancestor_el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if let Some(heading) = ancestor_el.select(&headings).next() {
            let text = collapse_whitespace(&element_text(heading));
            if !text.is_empty() {
                return Some(format!("Near: {}", truncate(&text, LOCATION_MAX_CHARS)));
            }
        }
        if ancestor_el.value().name() == "body" {
            break;
        }
    }
    None
}

fn collect_sections(page: &Page, snapshot: &mut PageSnapshot) {
    let mut processed: HashSet<NodeId> = HashSet::new();

    for css in MAIN_CONTENT_SELECTORS {
        let Some(selector) = super::dynamic_selector(css) else {
            continue;
        };
        for container in page.document().select(&selector) {
            if snapshot.sections.len() >= MAX_SECTIONS {
                return;
            }
            push_section(&container, &mut processed, snapshot);
        }
    }

    // Fallback for pages built entirely out of divs.
    if snapshot.sections.is_empty() {
        let divs = super::static_selector("div");
        for container in page.document().select(&divs) {
            if snapshot.sections.len() >= MAX_SECTIONS {
                return;
            }
            push_section(&container, &mut processed, snapshot);
        }
    }
}

fn push_section(
    container: &ElementRef<'_>,
    processed: &mut HashSet<NodeId>,
    snapshot: &mut PageSnapshot,
) {
    if processed.contains(&container.id()) || !is_visible(container) {
        return;
    }
    let text = collapse_whitespace(&element_text(*container));
    if text.chars().count() < MIN_SECTION_CHARS {
        return;
    }
    // Mark the whole subtree so nested containers are not re-emitted.
    processed.insert(container.id());
    for descendant in container.descendants() {
        processed.insert(descendant.id());
    }
    snapshot.sections.push(Section {
        title: section_title(container),
        text,
    });
}

/// A section's title: the nearest preceding sibling heading, else the
/// first heading inside the section itself.
fn section_title(container: &ElementRef<'_>) -> String {
    let mut sibling = container.prev_sibling();
    while let Some(node) = sibling {
        if let Some(el) = ElementRef::wrap(node) {
            if matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
                return collapse_whitespace(&element_text(el));
            }
            break;
        }
        sibling = node.prev_sibling();
    }
    let headings = super::static_selector("h1, h2, h3, h4, h5, h6");
    container
        .select(&headings)
        .next()
        .map(|h| collapse_whitespace(&element_text(h)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    fn scan(html: &str) -> PageSnapshot {
        let page = Page::parse(html, None);
        let text = page.full_text();
        scan_page(&page, &text)
    }

    #[test]
    fn test_title_and_metadata() {
        let snap = scan(
            r#"<html><head>
                <title>Senior Engineer - Acme</title>
                <meta name="description" content="Join Acme.">
                <meta property="og:title" content="Senior Engineer">
                <meta name="empty" content="">
            </head><body></body></html>"#,
        );
        assert_eq!(snap.title, "Senior Engineer - Acme");
        assert_eq!(snap.metadata["description"], "Join Acme.");
        assert_eq!(snap.metadata["og:title"], "Senior Engineer");
        assert!(!snap.metadata.contains_key("empty"));
    }

    #[test]
    fn test_headings_in_document_order() {
        let snap = scan("<body><h1>Role</h1><h3>Perks</h3><h2>Team</h2></body>");
        let levels: Vec<u8> = snap.headings.iter().map(|h| h.level).collect();
        assert_eq!(levels, vec![1, 3, 2]);
        assert_eq!(snap.headings[0].text, "Role");
    }

    #[test]
    fn test_apply_button_detection() {
        let snap = scan(
            r#"<body>
                <button id="apply-now">Apply Now</button>
                <button>Cancel</button>
                <a class="btn" href="/apply">Easy Apply</a>
            </body>"#,
        );
        assert_eq!(snap.buttons.len(), 3);
        assert_eq!(snap.apply_buttons.len(), 2);
        assert_eq!(snap.apply_buttons[0].text, "Apply Now");
        assert_eq!(snap.apply_buttons[1].kind, "link");
    }

    #[test]
    fn test_button_location_from_heading() {
        let snap = scan(
            r#"<body><section>
                <h2>Ready to join?</h2>
                <div><button>Apply</button></div>
            </section></body>"#,
        );
        assert_eq!(
            snap.buttons[0].location.as_deref(),
            Some("Near: Ready to join?")
        );
    }

    #[test]
    fn test_forms_count_fields() {
        let snap = scan(
            r#"<body><form id="application" action="/submit" method="post">
                <input name="a"><input name="b"><textarea name="c"></textarea>
            </form></body>"#,
        );
        assert_eq!(snap.forms.len(), 1);
        assert_eq!(snap.forms[0].id, "application");
        assert_eq!(snap.forms[0].method, "post");
        assert_eq!(snap.forms[0].num_fields, 3);
    }

    #[test]
    fn test_nested_sections_not_duplicated() {
        let filler = "word ".repeat(40);
        let snap = scan(&format!(
            r#"<body><main>
                <h2>Overview</h2>
                <div class="content">{filler}</div>
            </main></body>"#
        ));
        // main matched first; the nested .content subtree is suppressed.
        assert_eq!(snap.sections.len(), 1);
        assert_eq!(snap.sections[0].title, "Overview");
    }

    #[test]
    fn test_section_title_from_preceding_sibling() {
        let filler = "word ".repeat(40);
        let snap = scan(&format!(
            r#"<body>
                <h2>Benefits</h2>
                <section>{filler}</section>
            </body>"#
        ));
        assert_eq!(snap.sections[0].title, "Benefits");
    }

    #[test]
    fn test_div_fallback_sections() {
        let filler = "word ".repeat(40);
        let snap = scan(&format!("<body><div>{filler}</div></body>"));
        assert_eq!(snap.sections.len(), 1);
    }
}
