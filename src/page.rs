//! In-memory page: a parsed HTML tree plus a mutable form-state overlay.
//!
//! The HTML tree itself is never mutated. Extraction reads it; the form
//! populator writes into the overlay and appends to a synthetic-event log,
//! which is what page-native listeners would have observed in a browser.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// A value written into a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Checked(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Input,
    Change,
}

/// A synthetic DOM event recorded during form population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub target: String,
    pub bubbles: bool,
}

#[derive(Debug, Default)]
struct PageState {
    values: BTreeMap<String, FieldValue>,
    events: Vec<SyntheticEvent>,
}

/// One page visit: document, URL and mutable field state.
pub struct Page {
    html: Html,
    url: Option<Url>,
    state: PageState,
}

impl Page {
    /// Parse an HTML document. Parsing is lenient and never fails; a
    /// malformed document simply yields a sparse tree.
    pub fn parse(html: &str, url: Option<Url>) -> Self {
        Self {
            html: Html::parse_document(html),
            url,
            state: PageState::default(),
        }
    }

    pub fn document(&self) -> &Html {
        &self.html
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn url_str(&self) -> String {
        self.url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    /// Serialized HTML of the whole document.
    pub fn source_html(&self) -> String {
        self.html.root_element().html()
    }

    /// Overlay write for a form field, keyed by [`field_key`].
    /// Duplicate keys are last-write-wins.
    pub fn set_field(&mut self, key: impl Into<String>, value: FieldValue) {
        self.state.values.insert(key.into(), value);
    }

    pub fn field_state(&self, key: &str) -> Option<&FieldValue> {
        self.state.values.get(key)
    }

    pub fn dispatch(&mut self, event: SyntheticEvent) {
        self.state.events.push(event);
    }

    pub fn events(&self) -> &[SyntheticEvent] {
        &self.state.events
    }

    /// Visible text of the whole document body, whitespace-collapsed.
    /// Script/style subtrees and attribute-hidden elements contribute
    /// nothing.
    pub fn full_text(&self) -> String {
        let mut raw = String::new();
        if let Ok(body) = scraper::Selector::parse("body") {
            if let Some(root) = self.html.select(&body).next() {
                collect_visible_text(root, &mut raw);
            }
        }
        crate::util::collapse_whitespace(&raw)
    }
}

fn collect_visible_text(el: ElementRef<'_>, out: &mut String) {
    if matches!(
        el.value().name(),
        "script" | "style" | "noscript" | "template"
    ) || is_element_hidden(&el)
    {
        return;
    }
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            collect_visible_text(child_el, out);
        }
    }
}

/// Attribute-level hidden check for a single element. Without a layout
/// engine there is no computed style; `hidden`, `aria-hidden` and inline
/// `display:none` / `visibility:hidden` / `opacity:0` are the signals a
/// static tree carries.
pub fn is_element_hidden(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    if value.attr("aria-hidden") == Some("true") {
        return true;
    }
    if let Some(style) = value.attr("style") {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if style.contains("display:none")
            || style.contains("visibility:hidden")
            || style.contains("opacity:0;")
            || style.ends_with("opacity:0")
        {
            return true;
        }
    }
    false
}

/// True when neither the element nor any ancestor is hidden.
pub fn is_visible(el: &ElementRef<'_>) -> bool {
    if is_element_hidden(el) {
        return false;
    }
    for ancestor in el.ancestors() {
        if let Some(ancestor_el) = ElementRef::wrap(ancestor) {
            if is_element_hidden(&ancestor_el) {
                return false;
            }
        }
    }
    true
}

/// Concatenated text content of an element's subtree (textContent).
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for piece in el.text() {
        out.push_str(piece);
    }
    out
}

/// Stable overlay key for a field element: name, else id, else tag plus
/// placeholder. Mirrors how suggestions address fields on the wire.
pub fn field_key(el: &ElementRef<'_>) -> String {
    let value = el.value();
    if let Some(name) = value.attr("name") {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    if let Some(id) = value.attr("id") {
        if !id.is_empty() {
            return id.to_string();
        }
    }
    match value.attr("placeholder") {
        Some(placeholder) if !placeholder.is_empty() => {
            format!("{}:{}", value.name(), placeholder)
        }
        _ => value.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(page: &'a Page, css: &str) -> ElementRef<'a> {
        let sel = scraper::Selector::parse(css).unwrap();
        page.document().select(&sel).next().unwrap()
    }

    #[test]
    fn test_hidden_by_style_and_attribute() {
        let page = Page::parse(
            r#"<body>
                <div id="a" style="display: none">gone</div>
                <div id="b" hidden>gone</div>
                <div id="c" aria-hidden="true">gone</div>
                <div id="d">here</div>
            </body>"#,
            None,
        );
        assert!(is_element_hidden(&first(&page, "#a")));
        assert!(is_element_hidden(&first(&page, "#b")));
        assert!(is_element_hidden(&first(&page, "#c")));
        assert!(!is_element_hidden(&first(&page, "#d")));
    }

    #[test]
    fn test_visibility_inherits_from_ancestors() {
        let page = Page::parse(
            r#"<body><div style="visibility:hidden"><span id="x">text</span></div></body>"#,
            None,
        );
        let span = first(&page, "#x");
        assert!(!is_element_hidden(&span));
        assert!(!is_visible(&span));
    }

    #[test]
    fn test_full_text_skips_hidden_and_scripts() {
        let page = Page::parse(
            r#"<body>
                <p>Visible text.</p>
                <script>var x = 1;</script>
                <div style="display:none">invisible</div>
            </body>"#,
            None,
        );
        let text = page.full_text();
        assert!(text.contains("Visible text."));
        assert!(!text.contains("invisible"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_field_key_prefers_name() {
        let page = Page::parse(
            r#"<body><input name="email" id="field-1" placeholder="Email"></body>"#,
            None,
        );
        assert_eq!(field_key(&first(&page, "input")), "email");
    }

    #[test]
    fn test_overlay_last_write_wins() {
        let mut page = Page::parse("<body></body>", None);
        page.set_field("email", FieldValue::Text("a@b.c".into()));
        page.set_field("email", FieldValue::Text("d@e.f".into()));
        assert_eq!(
            page.field_state("email"),
            Some(&FieldValue::Text("d@e.f".into()))
        );
    }
}
