//! Form-field discovery and label association.
//!
//! Fields are discovered document-wide; many modern sites render inputs
//! outside any `<form>` tag. Hidden, submit-like, readonly and disabled
//! elements are excluded. Label resolution is a cascade, first non-empty
//! wins: explicit `label[for]`, wrapping `<label>`, a labelled sibling,
//! the placeholder, then the field name.

use scraper::ElementRef;
use std::collections::BTreeMap;

use crate::page::{element_text, Page};
use crate::snapshot::FieldDescriptor;
use crate::util::collapse_whitespace;

use super::{css_quote, dynamic_selector, static_selector};

/// Input types that cannot be filled and are skipped outright.
const SKIPPED_INPUT_TYPES: &[&str] = &["hidden", "submit", "button", "file", "image", "reset"];

const MAX_CONTEXT_HEADINGS: usize = 2;

/// Collect every fillable field descriptor on the page, standard tags
/// first, ARIA-virtual fields after.
pub fn extract_form_fields(page: &Page) -> Vec<FieldDescriptor> {
    let mut out = Vec::new();

    let standard = static_selector("input, textarea, select");
    for element in page.document().select(&standard) {
        if should_skip(&element) {
            continue;
        }
        out.push(describe_standard_field(page, element));
    }

    let virtual_fields = static_selector(
        r#"[role="textbox"], [role="combobox"], [role="button"], [contenteditable="true"]"#,
    );
    for element in page.document().select(&virtual_fields) {
        // Standard tags were already covered above.
        if matches!(element.value().name(), "input" | "textarea" | "select") {
            continue;
        }
        out.push(describe_virtual_field(page, element));
    }

    out
}

fn should_skip(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if let Some(input_type) = value.attr("type") {
        if SKIPPED_INPUT_TYPES.contains(&input_type.to_lowercase().as_str()) {
            return true;
        }
    }
    value.attr("readonly").is_some() || value.attr("disabled").is_some()
}

fn describe_standard_field(page: &Page, element: ElementRef<'_>) -> FieldDescriptor {
    let value = element.value();
    let tag = value.name().to_string();
    let kind = value
        .attr("type")
        .map(str::to_lowercase)
        .unwrap_or_else(|| tag.clone());

    FieldDescriptor {
        name: value.attr("name").unwrap_or_default().to_string(),
        id: value.attr("id").unwrap_or_default().to_string(),
        current_value: current_value(&element, &kind),
        label: find_label(page, &element),
        placeholder: value.attr("placeholder").unwrap_or_default().to_string(),
        aria_label: value.attr("aria-label").unwrap_or_default().to_string(),
        required: is_required(&element),
        nearby_context: nearby_context(&element),
        raw_attributes: attribute_map(&element),
        kind,
    }
}

fn describe_virtual_field(page: &Page, element: ElementRef<'_>) -> FieldDescriptor {
    let value = element.value();
    let kind = value
        .attr("role")
        .map(str::to_string)
        .unwrap_or_else(|| "contenteditable".to_string());
    let id = value.attr("id").unwrap_or_default().to_string();

    let label = value
        .attr("aria-label")
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| labelled_by_text(page, &element))
        .unwrap_or_else(|| find_label(page, &element));

    FieldDescriptor {
        kind,
        name: id.clone(),
        id,
        current_value: collapse_whitespace(&element_text(element)),
        label,
        placeholder: value.attr("placeholder").unwrap_or_default().to_string(),
        aria_label: value.attr("aria-label").unwrap_or_default().to_string(),
        required: value.attr("aria-required") == Some("true"),
        nearby_context: nearby_context(&element),
        raw_attributes: attribute_map(&element),
    }
}

/// Label cascade; each step only wins with non-empty text.
pub fn find_label(page: &Page, element: &ElementRef<'_>) -> String {
    // (a) Explicit label referencing the field by id.
    if let Some(id) = element.value().attr("id").filter(|id| !id.is_empty()) {
        if let Some(quoted) = css_quote(id) {
            if let Some(selector) = dynamic_selector(&format!("label[for={}]", quoted)) {
                if let Some(label) = page.document().select(&selector).next() {
                    let text = collapse_whitespace(&element_text(label));
                    if !text.is_empty() {
                        return text;
                    }
                }
            }
        }
    }

    // (b) Wrapping label, with the field's own text removed.
    for ancestor in element.ancestors() {
        let Some(ancestor_el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if ancestor_el.value().name() != "label" {
            continue;
        }
        let own = collapse_whitespace(&element_text(*element));
        let mut text = collapse_whitespace(&element_text(ancestor_el));
        if !own.is_empty() {
            text = collapse_whitespace(&text.replace(&own, ""));
        }
        if !text.is_empty() {
            return text;
        }
    }

    // (c) A labelled sibling: div, span or label next to the field.
    if let Some(parent) = element.parent() {
        for sibling in parent.children() {
            if sibling.id() == element.id() {
                continue;
            }
            let Some(sibling_el) = ElementRef::wrap(sibling) else {
                continue;
            };
            if !matches!(sibling_el.value().name(), "div" | "span" | "label") {
                continue;
            }
            let text = collapse_whitespace(&element_text(sibling_el));
            if !text.is_empty() {
                return text;
            }
        }
    }

    // (d) Placeholder, (e) field name.
    let value = element.value();
    if let Some(placeholder) = value.attr("placeholder").filter(|s| !s.is_empty()) {
        return placeholder.to_string();
    }
    value.attr("name").unwrap_or_default().to_string()
}

fn labelled_by_text(page: &Page, element: &ElementRef<'_>) -> Option<String> {
    let labelled_by = element.value().attr("aria-labelledby")?;
    let quoted = css_quote(labelled_by)?;
    let selector = dynamic_selector(&format!("[id={}]", quoted))?;
    let target = page.document().select(&selector).next()?;
    let text = collapse_whitespace(&element_text(target));
    (!text.is_empty()).then_some(text)
}

fn current_value(element: &ElementRef<'_>, kind: &str) -> String {
    if kind == "password" {
        return "******".to_string();
    }
    match element.value().name() {
        "textarea" => element_text(*element).trim().to_string(),
        "select" => selected_option_value(element),
        _ => element.value().attr("value").unwrap_or_default().to_string(),
    }
}

fn selected_option_value(element: &ElementRef<'_>) -> String {
    let options = static_selector("option");
    let mut first = None;
    for option in element.select(&options) {
        let value = option
            .value()
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(option).trim().to_string());
        if option.value().attr("selected").is_some() {
            return value;
        }
        if first.is_none() {
            first = Some(value);
        }
    }
    first.unwrap_or_default()
}

fn is_required(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    value.attr("required").is_some() || value.attr("aria-required") == Some("true")
}

/// Up to two headings found while walking toward the document root,
/// innermost first, joined with " > ".
fn nearby_context(element: &ElementRef<'_>) -> String {
    let headings = static_selector("h1, h2, h3, h4, h5, h6");
    let mut found: Vec<String> = Vec::new();
    for ancestor in element.ancestors() {
        let Some(ancestor_el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if ancestor_el.value().name() == "body" {
            break;
        }
        if let Some(heading) = ancestor_el.select(&headings).next() {
            let text = collapse_whitespace(&element_text(heading));
            if !text.is_empty() && found.last() != Some(&text) {
                found.push(text);
            }
        }
        if found.len() >= MAX_CONTEXT_HEADINGS {
            break;
        }
    }
    found.join(" > ")
}

fn attribute_map(element: &ElementRef<'_>) -> BTreeMap<String, String> {
    element
        .value()
        .attrs()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}
