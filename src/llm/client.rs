//! Completion client with bounded retry.
//!
//! Rate limiting (HTTP 429 or a rate-limit message in the body) triggers a
//! one-time switch to the fallback model plus an exponential backoff sleep,
//! up to `max_retries` retries. Every other failure is terminal on the
//! first occurrence.

use std::fmt;
use std::time::Duration;

use super::transport::{
    extract_reply_text, CompletionTransport, TransportError, TransportRequest,
};
use crate::config::Config;

/// Substituted when the API returns a well-formed but empty reply, which
/// in practice means content filtering or an exhausted output budget.
pub const EMPTY_REPLY_MESSAGE: &str =
    "The model returned an empty response. The content may have been \
     filtered or the output limit reached; try again with a shorter page.";

#[derive(Debug)]
pub enum CompletionError {
    /// No API key available from the environment or keychain.
    MissingCredential,
    Transport(TransportError),
    /// Still rate-limited after exhausting the retry budget.
    RateLimited { retries: u32 },
    /// Non-429 HTTP failure.
    Api { status: u16, body: String },
    /// 200 with a body in none of the known shapes.
    ResponseShape(String),
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::MissingCredential => {
                write!(f, "no API key configured; run with --setup or set GEMINI_API_KEY")
            }
            CompletionError::Transport(e) => write!(f, "transport failure: {}", e),
            CompletionError::RateLimited { retries } => {
                write!(f, "rate limited after {} retries", retries)
            }
            CompletionError::Api { status, body } => {
                write!(f, "API error {}: {}", status, crate::util::truncate(body, 200))
            }
            CompletionError::ResponseShape(body) => {
                write!(f, "unrecognized response shape: {}", crate::util::truncate(body, 200))
            }
        }
    }
}

impl std::error::Error for CompletionError {}

/// A successful completion, with enough retry telemetry for callers to
/// log and tests to assert on.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Model that produced the final reply (the fallback after a switch).
    pub model: String,
    pub retries: u32,
    pub delays: Vec<Duration>,
}

/// Retry knobs, lifted out of [`Config`] so tests can build them directly.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub model: String,
    pub fallback_model: String,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub exponential_backoff: bool,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            exponential_backoff: config.exponential_backoff,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }

    /// Delay before retry number `retry` (1-based). The delay is doubled
    /// before each sleep when exponential backoff is on, so the first
    /// retry already waits twice the initial delay; constant otherwise.
    fn delay_for(&self, retry: u32) -> Duration {
        if self.exponential_backoff {
            self.initial_delay * 2u32.saturating_pow(retry)
        } else {
            self.initial_delay
        }
    }
}

struct RetryState {
    attempts: u32,
    current_model: String,
    switched: bool,
    delays: Vec<Duration>,
}

pub struct CompletionClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: CompletionTransport> CompletionClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Run one prompt to completion, retrying through rate limits.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, CompletionError> {
        let mut state = RetryState {
            attempts: 0,
            current_model: self.policy.model.clone(),
            switched: false,
            delays: Vec::new(),
        };

        loop {
            state.attempts += 1;
            let request = TransportRequest {
                model: state.current_model.clone(),
                prompt: prompt.to_string(),
                max_output_tokens: self.policy.max_output_tokens,
                temperature: self.policy.temperature,
                top_p: self.policy.top_p,
            };

            let reply = self
                .transport
                .send(&request)
                .await
                .map_err(CompletionError::Transport)?;

            if is_rate_limited(reply.status, &reply.body) {
                let retries_so_far = state.attempts - 1;
                if retries_so_far >= self.policy.max_retries {
                    return Err(CompletionError::RateLimited {
                        retries: retries_so_far,
                    });
                }
                if !state.switched && !self.policy.fallback_model.is_empty() {
                    tracing::warn!(
                        from = %state.current_model,
                        to = %self.policy.fallback_model,
                        "rate limited, switching to fallback model"
                    );
                    state.current_model = self.policy.fallback_model.clone();
                    state.switched = true;
                }
                let delay = self.policy.delay_for(state.attempts);
                tracing::debug!(retry = state.attempts, ?delay, "backing off");
                state.delays.push(delay);
                tokio::time::sleep(delay).await;
                continue;
            }

            if !(200..300).contains(&reply.status) {
                return Err(CompletionError::Api {
                    status: reply.status,
                    body: reply.body,
                });
            }

            let text = match extract_reply_text(&reply.body) {
                None => return Err(CompletionError::ResponseShape(reply.body)),
                Some(None) => EMPTY_REPLY_MESSAGE.to_string(),
                Some(Some(text)) if text.trim().is_empty() => EMPTY_REPLY_MESSAGE.to_string(),
                Some(Some(text)) => text,
            };

            return Ok(Completion {
                text,
                model: state.current_model,
                retries: state.attempts - 1,
                delays: state.delays,
            });
        }
    }
}

fn is_rate_limited(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }
    let lower = body.to_lowercase();
    !(200..300).contains(&status)
        && (lower.contains("rate limit") || lower.contains("resource_exhausted"))
}
