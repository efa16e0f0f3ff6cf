//! Message protocol: one tagged-union request/response schema.
//!
//! Two wire dialects are accepted at the boundary. The copilot dialect
//! tags messages with an `action` key, the page-reader dialect with a
//! `type` key; both decode into the same [`Request`] enum and are handled
//! exhaustively from there. Replies keep each dialect's expected shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::page::{FieldValue, SyntheticEvent};
use crate::snapshot::{PageSnapshot, SuggestionSet};

/// Which wire dialect a request arrived in. Replies to dialect-sensitive
/// requests (ping) mirror it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Action,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping { dialect: Dialect },
    ExtractJobData,
    /// Legacy alias kept for old callers; answers with the description only.
    ExtractJobDescription,
    PopulateForm { suggestions: SuggestionSet },
    Scan,
    AnalyzePage,
    /// Unrecognized message name; acknowledged without action.
    Unknown { name: String },
}

impl Request {
    /// Decode either wire dialect. Messages with no recognizable tag and
    /// names nobody knows both land in `Unknown`; the channel stays open.
    pub fn decode(message: &Value) -> Request {
        let (name, dialect) = match tag_of(message) {
            Some(pair) => pair,
            None => {
                return Request::Unknown {
                    name: String::new(),
                }
            }
        };
        match name {
            "ping" => Request::Ping { dialect },
            "extractJobData" => Request::ExtractJobData,
            "extractJobDescription" => Request::ExtractJobDescription,
            "populateForm" => Request::PopulateForm {
                suggestions: decode_suggestions(message),
            },
            "scanPage" | "scan" => Request::Scan,
            "analyzePage" => Request::AnalyzePage,
            other => Request::Unknown {
                name: other.to_string(),
            },
        }
    }
}

fn tag_of(message: &Value) -> Option<(&str, Dialect)> {
    if let Some(name) = message.get("action").and_then(Value::as_str) {
        return Some((name, Dialect::Action));
    }
    if let Some(name) = message.get("type").and_then(Value::as_str) {
        return Some((name, Dialect::Type));
    }
    None
}

fn decode_suggestions(message: &Value) -> SuggestionSet {
    message
        .get("suggestions")
        .and_then(Value::as_object)
        .map(SuggestionSet::from_json_object)
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub enum Response {
    Pong { dialect: Dialect },
    JobData {
        job_description: String,
        field_labels: BTreeMap<String, String>,
    },
    JobDescription { job_description: String },
    PopulateAck {
        applied: Vec<String>,
        skipped: Vec<String>,
        /// Overlay writes from this batch, keyed by resolved field key.
        values: BTreeMap<String, FieldValue>,
        /// Synthetic events fired for this batch.
        events: Vec<SyntheticEvent>,
    },
    ScanResult {
        snapshot: Box<PageSnapshot>,
        ai_summary: Option<String>,
    },
    Processing,
    /// Ack for `Request::Unknown`.
    Ignored,
    Error { message: String },
}

impl Response {
    pub fn encode(&self) -> Value {
        match self {
            Response::Pong { dialect: Dialect::Action } => json!({"status": "ok"}),
            Response::Pong { dialect: Dialect::Type } => json!({"pong": true}),
            Response::JobData {
                job_description,
                field_labels,
            } => json!({
                "jobDescription": job_description,
                "formFields": field_labels,
            }),
            Response::JobDescription { job_description } => {
                json!({"jobDescription": job_description})
            }
            Response::PopulateAck {
                applied,
                skipped,
                values,
                events,
            } => json!({
                "status": "ok",
                "applied": applied,
                "skipped": skipped,
                "values": values,
                "events": events,
            }),
            Response::ScanResult {
                snapshot,
                ai_summary,
            } => {
                let mut value = serde_json::to_value(snapshot.as_ref()).unwrap_or(Value::Null);
                if let (Value::Object(map), Some(summary)) = (&mut value, ai_summary) {
                    map.insert("aiSummary".to_string(), Value::String(summary.clone()));
                }
                value
            }
            Response::Processing => json!({"status": "processing"}),
            Response::Ignored => json!({"status": "ignored"}),
            Response::Error { message } => json!({
                "status": "error",
                "error": message,
            }),
        }
    }
}

/// Fire-and-forget UI notifications; nothing waits on a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    AnalysisComplete,
    AnalysisError { error: String },
}

impl Notification {
    pub fn encode(&self) -> Value {
        match self {
            Notification::AnalysisComplete => json!({"action": "analysisComplete"}),
            Notification::AnalysisError { error } => json!({
                "action": "analysisError",
                "error": error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_action_dialect() {
        let req = Request::decode(&json!({"action": "ping"}));
        assert_eq!(req, Request::Ping { dialect: Dialect::Action });
    }

    #[test]
    fn test_decode_type_dialect() {
        let req = Request::decode(&json!({"type": "ping"}));
        assert_eq!(req, Request::Ping { dialect: Dialect::Type });
        assert_eq!(Request::decode(&json!({"type": "scanPage"})), Request::Scan);
    }

    #[test]
    fn test_ping_reply_mirrors_dialect() {
        let action = Response::Pong { dialect: Dialect::Action }.encode();
        assert_eq!(action, json!({"status": "ok"}));
        let ty = Response::Pong { dialect: Dialect::Type }.encode();
        assert_eq!(ty, json!({"pong": true}));
    }

    #[test]
    fn test_decode_populate_with_suggestions() {
        let req = Request::decode(&json!({
            "action": "populateForm",
            "suggestions": {"email": "a@b.c", "subscribed": true},
        }));
        match req {
            Request::PopulateForm { suggestions } => {
                assert_eq!(suggestions.get("email"), Some("a@b.c"));
                assert_eq!(suggestions.get("subscribed"), Some("true"));
            }
            other => panic!("expected PopulateForm, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_name_decodes_not_errors() {
        let req = Request::decode(&json!({"action": "selfDestruct"}));
        assert_eq!(
            req,
            Request::Unknown {
                name: "selfDestruct".to_string()
            }
        );
        // Tagless messages too.
        assert_eq!(
            Request::decode(&json!({"hello": 1})),
            Request::Unknown { name: String::new() }
        );
    }

    #[test]
    fn test_notifications_use_action_tag() {
        assert_eq!(
            Notification::AnalysisComplete.encode(),
            json!({"action": "analysisComplete"})
        );
        assert_eq!(
            Notification::AnalysisError {
                error: "no key".to_string()
            }
            .encode(),
            json!({"action": "analysisError", "error": "no key"})
        );
    }

    #[test]
    fn test_scan_result_carries_summary() {
        let response = Response::ScanResult {
            snapshot: Box::new(PageSnapshot::default()),
            ai_summary: Some("A job posting.".to_string()),
        };
        let value = response.encode();
        assert_eq!(value["aiSummary"], "A job posting.");
        assert!(value.get("headings").is_some());
    }
}
