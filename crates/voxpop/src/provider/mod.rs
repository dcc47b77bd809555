use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, ProviderKind, RetryConfig};

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Errors from a hosted text-understanding provider. Recoverable per call;
/// callers retry and then degrade rather than abort the run.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("{provider} request failed: {source}")]
  Request {
    provider: &'static str,
    #[source]
    source: reqwest::Error,
  },
  #[error("{provider} API error ({status}): {body}")]
  Api { provider: &'static str, status: u16, body: String },
  #[error("{provider} returned an unreadable response: {message}")]
  Malformed { provider: &'static str, message: String },
}

/// Seam for hosted language-model backends. Implementations handle
/// authentication, request formatting, and response text extraction.
#[async_trait]
pub trait ChatProvider: Send + Sync {
  /// Provider name (e.g. "anthropic", "openai")
  fn name(&self) -> &'static str;

  /// Send one user prompt, return the assistant's text
  async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError>;
}

/// Build the configured chat provider, if the resolved configuration names one
pub fn build_provider(config: &Config) -> Option<Arc<dyn ChatProvider>> {
  match config.provider {
    ProviderKind::Anthropic => config.anthropic_api_key.as_ref().map(|key| {
      Arc::new(AnthropicProvider::new(key, &config.anthropic_model, config.request_timeout))
        as Arc<dyn ChatProvider>
    }),
    ProviderKind::Openai => config.openai_api_key.as_ref().map(|key| {
      Arc::new(OpenAiProvider::new(key, &config.openai_model, config.request_timeout))
        as Arc<dyn ChatProvider>
    }),
    ProviderKind::Keyword => None,
  }
}

/// Call the provider with bounded retries and exponential backoff
pub async fn chat_with_retry(
  provider: &dyn ChatProvider,
  prompt: &str,
  max_tokens: u32,
  retry: &RetryConfig,
) -> Result<String, ProviderError> {
  let mut attempt = 0;
  loop {
    match provider.chat(prompt, max_tokens).await {
      Ok(text) => {
        if attempt > 0 {
          tracing::info!(provider = provider.name(), attempt = attempt + 1, "Provider recovered after retries");
        }
        return Ok(text);
      }
      Err(e) if attempt < retry.max_retries => {
        let delay = retry.backoff_delay(attempt);
        tracing::warn!(
          provider = provider.name(),
          attempt = attempt + 1,
          delay_ms = delay.as_millis() as u64,
          error = %e,
          "Provider call failed, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

/// Pull the JSON payload out of a model reply, tolerating markdown code fences
pub fn extract_json(text: &str) -> &str {
  let trimmed = text.trim();

  if let Some(rest) = trimmed.split_once("```json").map(|(_, rest)| rest) {
    if let Some((body, _)) = rest.split_once("```") {
      return body.trim();
    }
  }

  if let Some(rest) = trimmed.split_once("```").map(|(_, rest)| rest) {
    if let Some((body, _)) = rest.split_once("```") {
      return body.trim();
    }
  }

  trimmed
}
