use clap::ValueEnum;
use std::env;
use std::time::Duration;

/// Which relevance-discovery strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
  Anthropic,
  Openai,
  Keyword,
}

impl ProviderKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ProviderKind::Anthropic => "anthropic",
      ProviderKind::Openai => "openai",
      ProviderKind::Keyword => "keyword",
    }
  }

  fn from_name(name: &str) -> Option<Self> {
    match name {
      "anthropic" => Some(ProviderKind::Anthropic),
      "openai" => Some(ProviderKind::Openai),
      "keyword" => Some(ProviderKind::Keyword),
      _ => None,
    }
  }
}

/// Bounded retry with exponential backoff for provider calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub base_backoff_ms: u64,
  pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self { max_retries: 2, base_backoff_ms: 500, max_backoff_ms: 10_000 }
  }
}

impl RetryConfig {
  /// Delay before the next attempt, doubling per attempt up to the cap
  pub fn backoff_delay(&self, attempt: u32) -> Duration {
    let delay_ms = self
      .base_backoff_ms
      .saturating_mul(2_u64.saturating_pow(attempt))
      .min(self.max_backoff_ms);
    Duration::from_millis(delay_ms)
  }
}

/// Resolved pipeline configuration. Built once in main and passed into each
/// stage; no stage reads the environment itself.
#[derive(Debug, Clone)]
pub struct Config {
  pub provider: ProviderKind,
  pub anthropic_api_key: Option<String>,
  pub openai_api_key: Option<String>,
  pub anthropic_model: String,
  pub openai_model: String,
  pub request_timeout: Duration,
  pub retry: RetryConfig,
}

pub const ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

impl Config {
  /// Resolve the effective configuration from the requested provider and the
  /// process environment. A missing credential downgrades the whole run to the
  /// keyword strategy up front, not per item.
  pub fn resolve(requested: ProviderKind) -> Self {
    let requested = match env::var("VOXPOP_RELATION_PROVIDER") {
      Ok(name) => match ProviderKind::from_name(name.trim()) {
        Some(kind) => kind,
        None => {
          tracing::warn!(provider = %name, "Unknown provider in VOXPOP_RELATION_PROVIDER, using keyword fallback");
          ProviderKind::Keyword
        }
      },
      Err(_) => requested,
    };

    let anthropic_api_key = non_empty_env("ANTHROPIC_API_KEY");
    let openai_api_key = non_empty_env("OPENAI_API_KEY");

    let provider = match requested {
      ProviderKind::Anthropic if anthropic_api_key.is_none() => {
        tracing::warn!("ANTHROPIC_API_KEY not set, falling back to keyword matching");
        ProviderKind::Keyword
      }
      ProviderKind::Openai if openai_api_key.is_none() => {
        tracing::warn!("OPENAI_API_KEY not set, falling back to keyword matching");
        ProviderKind::Keyword
      }
      kind => kind,
    };

    Self {
      provider,
      anthropic_api_key,
      openai_api_key,
      anthropic_model: ANTHROPIC_MODEL.to_string(),
      openai_model: OPENAI_MODEL.to_string(),
      request_timeout: Duration::from_secs(120),
      retry: RetryConfig::default(),
    }
  }
}

fn non_empty_env(name: &str) -> Option<String> {
  env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backoff_doubles_per_attempt() {
    let retry = RetryConfig { max_retries: 3, base_backoff_ms: 100, max_backoff_ms: 10_000 };
    assert_eq!(retry.backoff_delay(0), Duration::from_millis(100));
    assert_eq!(retry.backoff_delay(1), Duration::from_millis(200));
    assert_eq!(retry.backoff_delay(2), Duration::from_millis(400));
  }

  #[test]
  fn test_backoff_is_capped() {
    let retry = RetryConfig { max_retries: 10, base_backoff_ms: 500, max_backoff_ms: 2_000 };
    assert_eq!(retry.backoff_delay(8), Duration::from_millis(2_000));
  }

  #[test]
  fn test_provider_kind_names_roundtrip() {
    for kind in [ProviderKind::Anthropic, ProviderKind::Openai, ProviderKind::Keyword] {
      assert_eq!(ProviderKind::from_name(kind.as_str()), Some(kind));
    }
    assert_eq!(ProviderKind::from_name("grok"), None);
  }
}
