use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatProvider, ProviderError};

const PROVIDER_NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic messages API client
pub struct AnthropicProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
}

impl AnthropicProvider {
  pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
    Self::with_base_url(api_key, model, timeout, "https://api.anthropic.com")
  }

  /// Custom base URL, used by tests to point at a local stub
  pub fn with_base_url(api_key: &str, model: &str, timeout: Duration, base_url: &str) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
      "x-api-key",
      HeaderValue::from_str(api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()
      .unwrap_or_else(|_| reqwest::Client::new());

    Self { client, base_url: base_url.to_string(), model: model.to_string() }
  }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
  fn name(&self) -> &'static str {
    PROVIDER_NAME
  }

  async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
    let url = format!("{}/v1/messages", self.base_url);
    let request = MessagesRequest {
      model: self.model.clone(),
      max_tokens,
      messages: vec![Message { role: "user", content: prompt.to_string() }],
    };

    let response = self
      .client
      .post(&url)
      .json(&request)
      .send()
      .await
      .map_err(|e| ProviderError::Request { provider: PROVIDER_NAME, source: e })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ProviderError::Api { provider: PROVIDER_NAME, status: status.as_u16(), body });
    }

    let parsed: MessagesResponse = response
      .json()
      .await
      .map_err(|e| ProviderError::Malformed { provider: PROVIDER_NAME, message: e.to_string() })?;

    let text = parsed
      .content
      .iter()
      .filter(|block| block.block_type == "text")
      .map(|block| block.text.as_str())
      .collect::<Vec<_>>()
      .join("");

    if text.is_empty() {
      return Err(ProviderError::Malformed {
        provider: PROVIDER_NAME,
        message: "response contained no text blocks".to_string(),
      });
    }

    Ok(text)
  }
}

#[derive(Serialize)]
struct MessagesRequest {
  model: String,
  max_tokens: u32,
  messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
  role: &'static str,
  content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  block_type: String,
  #[serde(default)]
  text: String,
}
