//! Structured extraction results and the analysis-cycle data model.
//!
//! A [`PageSnapshot`] is produced fresh per extraction call and never
//! mutated afterwards; the orchestrator owns it for the duration of one
//! analysis cycle. Serde renames keep the wire shapes compatible with the
//! message protocol in [`crate::router`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::util::truncate_chars;

/// Caps applied when projecting a snapshot into a prompt, to control
/// token cost.
pub const PROMPT_MAX_HEADINGS: usize = 20;
pub const PROMPT_MAX_FIELDS: usize = 30;
pub const PROMPT_MAX_BUTTONS: usize = 20;
pub const PROMPT_MAX_TEXT_CHARS: usize = 6000;

/// Cap on the raw HTML carried in a snapshot.
pub const MAX_HTML_CHARS: usize = 200_000;

/// One heading in document order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heading {
    /// Heading depth (1-6).
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkInfo {
    pub text: String,
    pub href: String,
    pub id: String,
    pub classes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    pub alt: String,
    pub src: String,
    pub width: Option<String>,
    pub height: Option<String>,
}

/// A `<form>` element summary (fields are described separately, page-wide).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormInfo {
    pub id: String,
    pub name: String,
    pub action: String,
    pub method: String,
    pub num_fields: usize,
}

/// A clickable element (button, role=button, submit input, styled link).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub href: String,
    pub id: String,
    pub classes: String,
    pub disabled: bool,
    /// Nearest heading/section context, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A run of visible text under one main-content container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub text: String,
}

/// A fillable (or ARIA-virtual) field and everything we know about it.
///
/// Uniqueness is per-name in practice; duplicate names are last-write-wins
/// in any consuming map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub id: String,
    #[serde(rename = "value")]
    pub current_value: String,
    pub label: String,
    pub placeholder: String,
    pub aria_label: String,
    pub required: bool,
    /// Nearby headings, outermost last, joined with " > ".
    #[serde(rename = "context")]
    pub nearby_context: String,
    #[serde(rename = "attributes")]
    pub raw_attributes: BTreeMap<String, String>,
}

/// Job attributes derived by regex heuristics; every field is best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    /// Matches against a fixed skill vocabulary, first-seen order, deduped.
    pub skills: Vec<String>,
    pub education: Vec<String>,
    pub experience: Vec<String>,
}

/// The structured extraction result for one page visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub metadata: BTreeMap<String, String>,
    pub headings: Vec<Heading>,
    pub links: Vec<LinkInfo>,
    pub images: Vec<ImageInfo>,
    pub form_fields: Vec<FieldDescriptor>,
    pub forms: Vec<FormInfo>,
    pub apply_buttons: Vec<ButtonInfo>,
    pub buttons: Vec<ButtonInfo>,
    pub sections: Vec<Section>,
    #[serde(rename = "jobDetails")]
    pub job: JobAttributes,
    pub job_description: String,
    pub full_text: String,
    #[serde(rename = "htmlSource")]
    pub truncated_html: String,
}

impl PageSnapshot {
    /// Map of field name -> resolved label, for the form-fill prompt and
    /// the `extractJobData` response. Empty names are dropped; duplicate
    /// names are last-write-wins.
    pub fn field_labels(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for field in &self.form_fields {
            if !field.name.is_empty() {
                out.insert(field.name.clone(), field.label.clone());
            }
        }
        out
    }

    /// Size-bounded projection sent to the completion API.
    pub fn prompt_projection(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "url": self.url,
            "headings": self.headings.iter().take(PROMPT_MAX_HEADINGS).collect::<Vec<_>>(),
            "formFields": self.form_fields.iter().take(PROMPT_MAX_FIELDS).collect::<Vec<_>>(),
            "buttons": self.buttons.iter().take(PROMPT_MAX_BUTTONS).collect::<Vec<_>>(),
            "jobDetails": self.job,
            "textSample": truncate_chars(&self.full_text, PROMPT_MAX_TEXT_CHARS),
        })
    }
}

/// Model-proposed field-name-to-value mapping for form filling.
///
/// Tolerates partial coverage (not every field needs a suggestion) and
/// unknown keys (the populator simply finds no target and skips them).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SuggestionSet {
    values: BTreeMap<String, String>,
}

impl SuggestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object, stringifying booleans and numbers so that
    /// boolean-ish tokens survive ("true", "yes", ...). Non-scalar values
    /// are kept as their JSON text.
    pub fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in map {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            values.insert(key.clone(), text);
        }
        Self { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Lifecycle status of one analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Complete,
    Error,
}

/// Persisted outcome of one analysis cycle.
///
/// Records are stamped with a cycle id and start timestamp so a slow
/// earlier cycle can never clobber a faster later one: the store rejects
/// writes older than what it already holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub status: AnalysisStatus,
    /// Free-text suggestions, or the suggestion JSON for the form-fill path.
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisRecord {
    pub fn processing(cycle_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            status: AnalysisStatus::Processing,
            payload: String::new(),
            error: None,
        }
    }

    pub fn complete(cycle_id: Uuid, started_at: DateTime<Utc>, payload: String) -> Self {
        Self {
            cycle_id,
            started_at,
            status: AnalysisStatus::Complete,
            payload,
            error: None,
        }
    }

    pub fn error(cycle_id: Uuid, started_at: DateTime<Utc>, message: String) -> Self {
        Self {
            cycle_id,
            started_at,
            status: AnalysisStatus::Error,
            payload: String::new(),
            error: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_labels_last_write_wins() {
        let mut snap = PageSnapshot::default();
        snap.form_fields.push(FieldDescriptor {
            name: "email".into(),
            label: "Work email".into(),
            ..Default::default()
        });
        snap.form_fields.push(FieldDescriptor {
            name: "email".into(),
            label: "Personal email".into(),
            ..Default::default()
        });
        snap.form_fields.push(FieldDescriptor {
            label: "Unnamed".into(),
            ..Default::default()
        });

        let labels = snap.field_labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["email"], "Personal email");
    }

    #[test]
    fn test_prompt_projection_caps() {
        let mut snap = PageSnapshot::default();
        for i in 0..40 {
            snap.headings.push(Heading {
                level: 2,
                text: format!("h{}", i),
            });
        }
        snap.full_text = "x".repeat(10_000);

        let projection = snap.prompt_projection();
        let headings = projection["headings"].as_array().unwrap();
        assert_eq!(headings.len(), PROMPT_MAX_HEADINGS);
        let sample = projection["textSample"].as_str().unwrap();
        assert_eq!(sample.chars().count(), PROMPT_MAX_TEXT_CHARS);
    }

    #[test]
    fn test_suggestion_set_stringifies_scalars() {
        let raw: serde_json::Value = serde_json::json!({
            "firstName": "Jane",
            "subscribed": true,
            "years": 5,
            "skip": null,
        });
        let set = SuggestionSet::from_json_object(raw.as_object().unwrap());
        assert_eq!(set.get("firstName"), Some("Jane"));
        assert_eq!(set.get("subscribed"), Some("true"));
        assert_eq!(set.get("years"), Some("5"));
        assert_eq!(set.get("skip"), None);
    }
}
