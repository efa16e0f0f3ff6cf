//! Transport seam for the completion API.
//!
//! The retry machine in [`crate::llm::client`] only sees this trait, so it
//! can be driven by a scripted transport in tests. The production
//! implementation speaks the Gemini REST shape over `reqwest`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// One completion attempt, already resolved to a concrete model.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Raw HTTP outcome; the client layers shape parsing and retry policy on
/// top.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug)]
pub enum TransportError {
    Timeout,
    Http(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Http(msg) => write!(f, "http error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub trait CompletionTransport: Send + Sync {
    fn send(
        &self,
        request: &TransportRequest,
    ) -> impl Future<Output = Result<TransportReply, TransportError>> + Send;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    contents: Vec<WireContent<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Serialize)]
struct WireContent<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct WireGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
}

/// Tolerated response shapes, most common first.
#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Deserialize)]
struct WireResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Pull the completion text out of a response body, accepting any of the
/// three shapes the API has been seen to produce. `None` means the body
/// parsed but carried no text anywhere.
pub fn extract_reply_text(body: &str) -> Option<Option<String>> {
    let parsed: WireResponse = serde_json::from_str(body).ok()?;
    if let Some(candidate) = parsed.candidates.first() {
        if let Some(content) = &candidate.content {
            if let Some(part) = content.parts.first() {
                if let Some(text) = &part.text {
                    return Some(Some(text.clone()));
                }
            }
        }
        if let Some(output) = &candidate.output {
            return Some(Some(output.clone()));
        }
    }
    if let Some(text) = parsed.text {
        return Some(Some(text));
    }
    Some(None)
}

/// Production transport: Gemini `generateContent` over HTTPS with a
/// per-request timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            model,
            self.api_key
        )
    }
}

impl CompletionTransport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportReply, TransportError> {
        let body = WireRequest {
            contents: vec![WireContent {
                parts: vec![WirePart {
                    text: &request.prompt,
                }],
            }],
            generation_config: WireGenerationConfig {
                max_output_tokens: request.max_output_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
            },
        };

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(TransportReply { status, body })
    }
}
