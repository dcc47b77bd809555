use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ChatProvider, ProviderError};

const PROVIDER_NAME: &str = "openai";

/// OpenAI chat completions client. Requests JSON-object responses so replies
/// parse without fence stripping.
pub struct OpenAiProvider {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl OpenAiProvider {
  pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
    Self::with_base_url(api_key, model, timeout, "https://api.openai.com")
  }

  /// Custom base URL, used by tests to point at a local stub
  pub fn with_base_url(api_key: &str, model: &str, timeout: Duration, base_url: &str) -> Self {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .unwrap_or_else(|_| reqwest::Client::new());

    Self {
      client,
      api_key: api_key.to_string(),
      base_url: base_url.to_string(),
      model: model.to_string(),
    }
  }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
  fn name(&self) -> &'static str {
    PROVIDER_NAME
  }

  async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
    let url = format!("{}/v1/chat/completions", self.base_url);
    let body = json!({
      "model": self.model,
      "max_tokens": max_tokens,
      "messages": [{"role": "user", "content": prompt}],
      "response_format": {"type": "json_object"},
    });

    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await
      .map_err(|e| ProviderError::Request { provider: PROVIDER_NAME, source: e })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ProviderError::Api { provider: PROVIDER_NAME, status: status.as_u16(), body });
    }

    let parsed: CompletionsResponse = response
      .json()
      .await
      .map_err(|e| ProviderError::Malformed { provider: PROVIDER_NAME, message: e.to_string() })?;

    parsed
      .choices
      .into_iter()
      .next()
      .map(|choice| choice.message.content)
      .filter(|content| !content.is_empty())
      .ok_or_else(|| ProviderError::Malformed {
        provider: PROVIDER_NAME,
        message: "response contained no choices".to_string(),
      })
  }
}

#[derive(Deserialize)]
struct CompletionsResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  content: String,
}
