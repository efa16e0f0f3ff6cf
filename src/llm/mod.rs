//! Completion pipeline: prompt construction, transport, bounded retry and
//! reply parsing.

pub mod client;
pub mod parse;
pub mod prompts;
pub mod transport;

pub use client::{Completion, CompletionClient, CompletionError, RetryPolicy};
pub use parse::{parse_suggestions, ParsedSuggestions};
pub use transport::{CompletionTransport, HttpTransport};

use std::time::Duration;

use crate::config::Config;

/// Build the production client from config. Fails fast when no API key is
/// available anywhere.
pub fn http_client(config: &Config) -> Result<CompletionClient<HttpTransport>, CompletionError> {
    let api_key = config
        .get_api_key()
        .ok_or(CompletionError::MissingCredential)?;
    let transport = HttpTransport::new(
        transport::DEFAULT_BASE_URL,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    );
    Ok(CompletionClient::new(
        transport,
        RetryPolicy::from_config(config),
    ))
}
