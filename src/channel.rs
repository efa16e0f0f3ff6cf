//! Cross-context RPC.
//!
//! A page context owns the parsed HTML tree, which is not `Send`, so it
//! lives on a dedicated thread and is only reachable through a typed
//! request channel. Callers get exactly one reply per request, through a
//! oneshot, with a timeout enforced on the async side. Dropping all
//! handles closes the queue and the thread exits.

use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

use url::Url;

use crate::extract;
use crate::page::Page;
use crate::populate::populate;
use crate::router::{Request, Response};

#[derive(Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// The context thread is gone; the caller should re-inject.
    ContextGone,
    Timeout,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::ContextGone => write!(f, "page context is not responding"),
            ChannelError::Timeout => write!(f, "page context timed out"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Everything needed to (re)build a page context.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub html: String,
    pub url: Option<Url>,
}

struct Envelope {
    request: Request,
    reply: tokio::sync::oneshot::Sender<Response>,
}

/// Cloneable handle to one page-context thread.
#[derive(Clone)]
pub struct ContextHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ContextHandle {
    /// Send one request and wait for its reply, up to `timeout`.
    pub async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, ChannelError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .map_err(|_| ChannelError::ContextGone)?;
        match tokio::time::timeout(timeout, reply_rx).await {
            Err(_) => Err(ChannelError::Timeout),
            Ok(Err(_)) => Err(ChannelError::ContextGone),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

/// Spawn a context thread for one page. This is the "injection" step; the
/// orchestrator calls it again whenever a ping goes unanswered.
pub fn spawn_page_context(source: PageSource) -> ContextHandle {
    let (tx, rx) = mpsc::channel::<Envelope>();
    std::thread::spawn(move || {
        let mut page = Page::parse(&source.html, source.url);
        tracing::debug!(url = %page.url_str(), "page context up");
        while let Ok(envelope) = rx.recv() {
            let response = handle_request(&mut page, envelope.request);
            // A dropped receiver means the caller timed out; nothing to do.
            let _ = envelope.reply.send(response);
        }
        tracing::debug!("page context shutting down");
    });
    ContextHandle { tx }
}

/// Exhaustive request dispatch against the owned page.
fn handle_request(page: &mut Page, request: Request) -> Response {
    match request {
        Request::Ping { dialect } => Response::Pong { dialect },
        Request::ExtractJobData => {
            let snapshot = extract::extract(page);
            Response::JobData {
                field_labels: snapshot.field_labels(),
                job_description: snapshot.job_description,
            }
        }
        Request::ExtractJobDescription => Response::JobDescription {
            job_description: extract::job::job_description(page),
        },
        Request::PopulateForm { suggestions } => {
            let events_before = page.events().len();
            let report = populate(page, &suggestions);
            Response::PopulateAck {
                applied: report.applied,
                skipped: report.skipped,
                values: report.values,
                events: page.events()[events_before..].to_vec(),
            }
        }
        Request::Scan => Response::ScanResult {
            snapshot: Box::new(extract::extract(page)),
            ai_summary: None,
        },
        // Analysis is an orchestrator concern; a context reached directly
        // just reports that the cycle machinery owns it.
        Request::AnalyzePage => Response::Processing,
        Request::Unknown { name } => {
            if !name.is_empty() {
                tracing::debug!(name, "ignoring unknown request");
            }
            Response::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Dialect;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn context(html: &str) -> ContextHandle {
        spawn_page_context(PageSource {
            html: html.to_string(),
            url: None,
        })
    }

    #[tokio::test]
    async fn test_ping_round_trip() {
        let handle = context("<body></body>");
        let response = handle
            .request(Request::Ping { dialect: Dialect::Action }, TIMEOUT)
            .await
            .unwrap();
        assert!(matches!(response, Response::Pong { dialect: Dialect::Action }));
    }

    #[tokio::test]
    async fn test_extract_job_data_over_channel() {
        let handle = context(
            r#"<body>
                <label for="e">Email</label><input id="e" name="email">
            </body>"#,
        );
        let response = handle.request(Request::ExtractJobData, TIMEOUT).await.unwrap();
        match response {
            Response::JobData { field_labels, .. } => {
                assert_eq!(field_labels["email"], "Email");
            }
            other => panic!("expected JobData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_populate_over_channel_reports_events() {
        let handle = context(r#"<body><input name="email"></body>"#);
        let mut suggestions = crate::snapshot::SuggestionSet::new();
        suggestions.insert("email", "a@b.c");
        let response = handle
            .request(Request::PopulateForm { suggestions }, TIMEOUT)
            .await
            .unwrap();
        match response {
            Response::PopulateAck { applied, events, .. } => {
                assert_eq!(applied, vec!["email"]);
                assert_eq!(events.len(), 2);
            }
            other => panic!("expected PopulateAck, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_state_persists_across_requests() {
        let handle = context(r#"<body><input name="email"></body>"#);
        let mut suggestions = crate::snapshot::SuggestionSet::new();
        suggestions.insert("email", "a@b.c");
        handle
            .request(Request::PopulateForm { suggestions }, TIMEOUT)
            .await
            .unwrap();

        // A second batch starts its event log after the first.
        let mut more = crate::snapshot::SuggestionSet::new();
        more.insert("email", "d@e.f");
        let response = handle
            .request(Request::PopulateForm { suggestions: more }, TIMEOUT)
            .await
            .unwrap();
        match response {
            Response::PopulateAck { values, events, .. } => {
                assert_eq!(events.len(), 2);
                assert_eq!(
                    values["email"],
                    crate::page::FieldValue::Text("d@e.f".into())
                );
            }
            other => panic!("expected PopulateAck, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_request_acknowledged() {
        let handle = context("<body></body>");
        let response = handle
            .request(
                Request::Unknown {
                    name: "mystery".to_string(),
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert!(matches!(response, Response::Ignored));
    }
}
