//! Shared test support.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::llm::transport::{
    CompletionTransport, TransportError, TransportReply, TransportRequest,
};

/// Transport double that replays a fixed script of (status, body) replies
/// and records what it was asked.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<TransportRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<(u16, String)>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Delay every reply, for tests that need an in-flight window.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Models each request was routed to, in order.
    pub fn models_seen(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }
}

impl CompletionTransport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some((status, body)) => Ok(TransportReply { status, body }),
            None => Err(TransportError::Http("script exhausted".to_string())),
        }
    }
}

/// A small job posting with a fillable form, used across modules.
pub const JOB_PAGE_HTML: &str = r#"<html><head><title>Senior Rust Engineer - Acme</title></head>
<body>
  <h1>Senior Rust Engineer</h1>
  <div class="job-description">
    We are hiring a Senior Rust Engineer. Responsibilities include building
    and operating distributed systems, reviewing designs, and mentoring.
    Qualifications: 5+ years of systems experience, strong Rust, SQL and
    Docker. Salary $150,000 - $180,000 USD. Remote.
  </div>
  <form id="application" action="/apply" method="post">
    <label for="email-field">Email</label>
    <input id="email-field" name="email" type="email">
    <button type="submit">Apply Now</button>
  </form>
</body></html>"#;
