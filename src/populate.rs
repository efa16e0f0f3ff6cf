//! Form population: write model suggestions into the page overlay.
//!
//! Each suggestion is resolved to a field through a selector cascade,
//! exact matches before substring matches. Fields that resolve nowhere
//! are skipped and counted; one bad suggestion never aborts the batch.

use scraper::ElementRef;
use std::collections::BTreeMap;

use crate::extract::{css_quote, dynamic_selector, static_selector};
use crate::page::{field_key, EventKind, FieldValue, Page, SyntheticEvent};
use crate::snapshot::SuggestionSet;

/// Tokens interpreted as "checked" for checkbox and radio targets.
const TRUTHY_TOKENS: &[&str] = &["true", "yes", "on"];

#[derive(Debug, Default)]
pub struct PopulateReport {
    /// Suggestion names that were written.
    pub applied: Vec<String>,
    /// Suggestion names with no matching field on the page.
    pub skipped: Vec<String>,
    /// What landed in the overlay, keyed by resolved field key.
    pub values: BTreeMap<String, FieldValue>,
}

struct PendingWrite {
    key: String,
    value: FieldValue,
    fire_input: bool,
}

/// Apply a suggestion set to the page. Never fails; the report says what
/// landed where.
pub fn populate(page: &mut Page, suggestions: &SuggestionSet) -> PopulateReport {
    let mut report = PopulateReport::default();
    let mut writes: Vec<PendingWrite> = Vec::new();

    for (name, value) in suggestions.iter() {
        let Some(target) = resolve_target(page, name) else {
            tracing::debug!(field = name, "no matching element, skipping");
            report.skipped.push(name.to_string());
            continue;
        };
        writes.push(plan_write(&target, value));
        report.applied.push(name.to_string());
    }

    for write in writes {
        report.values.insert(write.key.clone(), write.value.clone());
        page.set_field(write.key.clone(), write.value);
        if write.fire_input {
            page.dispatch(SyntheticEvent {
                kind: EventKind::Input,
                target: write.key.clone(),
                bubbles: true,
            });
        }
        page.dispatch(SyntheticEvent {
            kind: EventKind::Change,
            target: write.key,
            bubbles: true,
        });
    }

    report
}

/// Selector cascade for one suggestion name; the first hit wins, visible
/// or not. Hidden inputs back custom select widgets, and virtual fields
/// (contenteditable, role=textbox) are matched by id like anything else.
fn resolve_target<'a>(page: &'a Page, name: &str) -> Option<ElementRef<'a>> {
    let quoted = css_quote(name)?;
    let cascade = [
        format!("[name={quoted}]"),
        format!("[id={quoted}]"),
        format!("[name*={quoted}]"),
        format!("[id*={quoted}]"),
        format!("input[placeholder*={quoted}]"),
        format!("textarea[placeholder*={quoted}]"),
    ];
    for css in &cascade {
        let Some(selector) = dynamic_selector(css) else {
            continue;
        };
        if let Some(candidate) = page.document().select(&selector).next() {
            return Some(candidate);
        }
    }
    None
}

fn plan_write(target: &ElementRef<'_>, value: &str) -> PendingWrite {
    let key = field_key(target);
    let input_type = target
        .value()
        .attr("type")
        .map(str::to_lowercase)
        .unwrap_or_default();

    match target.value().name() {
        "select" => PendingWrite {
            key,
            value: FieldValue::Text(select_option_value(target, value)),
            fire_input: false,
        },
        "input" if input_type == "checkbox" || input_type == "radio" => PendingWrite {
            key,
            value: FieldValue::Checked(is_truthy(value)),
            fire_input: false,
        },
        _ => PendingWrite {
            key,
            value: FieldValue::Text(value.to_string()),
            fire_input: true,
        },
    }
}

/// Match an option whose visible text contains the suggested value,
/// case-insensitively; assign its value attribute when present, otherwise
/// the raw suggestion text.
fn select_option_value(select: &ElementRef<'_>, value: &str) -> String {
    let options = static_selector("option");
    let wanted = value.trim().to_lowercase();
    for option in select.select(&options) {
        let text = crate::page::element_text(option).trim().to_lowercase();
        if text.contains(&wanted) {
            return option
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
        }
    }
    value.to_string()
}

fn is_truthy(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    TRUTHY_TOKENS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    fn suggestions(pairs: &[(&str, &str)]) -> SuggestionSet {
        let mut set = SuggestionSet::new();
        for (k, v) in pairs {
            set.insert(*k, *v);
        }
        set
    }

    #[test]
    fn test_exact_name_match_writes_value_and_events() {
        let mut page = Page::parse(r#"<body><input name="email"></body>"#, None);
        let report = populate(&mut page, &suggestions(&[("email", "jane@example.com")]));

        assert_eq!(report.applied, vec!["email"]);
        assert!(report.skipped.is_empty());
        assert_eq!(
            page.field_state("email"),
            Some(&FieldValue::Text("jane@example.com".into()))
        );
        let kinds: Vec<EventKind> = page.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Input, EventKind::Change]);
        assert!(page.events().iter().all(|e| e.bubbles));
    }

    #[test]
    fn test_unmatched_field_skipped_rest_applied() {
        let mut page = Page::parse(r#"<body><input name="email"></body>"#, None);
        let report = populate(
            &mut page,
            &suggestions(&[("email", "a@b.c"), ("phone", "555-1234")]),
        );

        assert_eq!(report.applied, vec!["email"]);
        assert_eq!(report.skipped, vec!["phone"]);
        assert!(page.field_state("email").is_some());
    }

    #[test]
    fn test_substring_match_fallback() {
        let mut page = Page::parse(
            r#"<body><input name="applicant_email_address"></body>"#,
            None,
        );
        let report = populate(&mut page, &suggestions(&[("email", "a@b.c")]));

        assert_eq!(report.applied, vec!["email"]);
        assert_eq!(
            page.field_state("applicant_email_address"),
            Some(&FieldValue::Text("a@b.c".into()))
        );
    }

    #[test]
    fn test_checkbox_truthy_tokens() {
        let mut page = Page::parse(
            r#"<body>
                <input type="checkbox" name="subscribed">
                <input type="checkbox" name="relocate">
            </body>"#,
            None,
        );
        populate(
            &mut page,
            &suggestions(&[("subscribed", "Yes"), ("relocate", "no")]),
        );

        assert_eq!(
            page.field_state("subscribed"),
            Some(&FieldValue::Checked(true))
        );
        assert_eq!(
            page.field_state("relocate"),
            Some(&FieldValue::Checked(false))
        );
    }

    #[test]
    fn test_select_matches_option_text() {
        let mut page = Page::parse(
            r#"<body><select name="country">
                <option value="us">United States</option>
                <option value="ca">Canada</option>
            </select></body>"#,
            None,
        );
        populate(&mut page, &suggestions(&[("country", "canada")]));

        assert_eq!(
            page.field_state("country"),
            Some(&FieldValue::Text("ca".into()))
        );
        // No input event for selects, change only.
        let kinds: Vec<EventKind> = page.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Change]);
    }

    #[test]
    fn test_select_partial_option_text_assigns_value() {
        let mut page = Page::parse(
            r#"<body><select name="country">
                <option value="us">United States of America</option>
                <option value="uk">United Kingdom</option>
            </select></body>"#,
            None,
        );
        populate(&mut page, &suggestions(&[("country", "United States")]));

        assert_eq!(
            page.field_state("country"),
            Some(&FieldValue::Text("us".into()))
        );
    }

    #[test]
    fn test_select_without_matching_option_keeps_raw() {
        let mut page = Page::parse(
            r#"<body><select name="country"><option value="us">United States</option></select></body>"#,
            None,
        );
        populate(&mut page, &suggestions(&[("country", "Atlantis")]));
        assert_eq!(
            page.field_state("country"),
            Some(&FieldValue::Text("Atlantis".into()))
        );
    }

    #[test]
    fn test_hidden_input_backing_custom_widget_is_written() {
        let mut page = Page::parse(
            r#"<body><input name="country" style="display:none" type="hidden"></body>"#,
            None,
        );
        let report = populate(&mut page, &suggestions(&[("country", "CA")]));
        assert_eq!(report.applied, vec!["country"]);
        assert_eq!(
            page.field_state("country"),
            Some(&FieldValue::Text("CA".into()))
        );
    }

    #[test]
    fn test_contenteditable_virtual_field_matched_by_id() {
        let mut page = Page::parse(
            r#"<body><div id="cover-letter" role="textbox" contenteditable="true"></div></body>"#,
            None,
        );
        let report = populate(&mut page, &suggestions(&[("cover-letter", "Dear team")]));
        assert_eq!(report.applied, vec!["cover-letter"]);
        assert_eq!(
            page.field_state("cover-letter"),
            Some(&FieldValue::Text("Dear team".into()))
        );
        let kinds: Vec<EventKind> = page.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Input, EventKind::Change]);
    }
}
