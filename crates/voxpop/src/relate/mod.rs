use async_trait::async_trait;
use colored::*;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::RetryConfig;
use crate::model::{Edge, Item};
use crate::provider::{chat_with_retry, extract_json, ChatProvider};

mod keyword;

pub use keyword::{find_by_overlap, tokenize_summary, KeywordFinder, STOP_WORDS};

/// One candidate relationship proposed for a focal item
#[derive(Debug, Clone, Deserialize)]
pub struct Relation {
  pub id: u32,
  pub reason: String,
}

/// Strategy seam for relevance discovery: given the full corpus and one focal
/// item, return the most related other items with a justification each.
#[async_trait]
pub trait RelatedFinder: Send + Sync {
  fn name(&self) -> &'static str;

  async fn find_related(&self, items: &[Item], focal: &Item) -> anyhow::Result<Vec<Relation>>;
}

// The full-context design is bounded; larger corpora need an embeddings pass
const CONTEXT_WINDOW_THRESHOLD: usize = 100;
const RELATE_MAX_TOKENS: u32 = 1024;

/// Provider-backed relevance strategy. The prompt contract is identical for
/// every hosted backend; only the transport differs.
pub struct ProviderFinder {
  provider: Arc<dyn ChatProvider>,
  retry: RetryConfig,
}

impl ProviderFinder {
  pub fn new(provider: Arc<dyn ChatProvider>, retry: RetryConfig) -> Self {
    Self { provider, retry }
  }
}

#[async_trait]
impl RelatedFinder for ProviderFinder {
  fn name(&self) -> &'static str {
    self.provider.name()
  }

  async fn find_related(&self, items: &[Item], focal: &Item) -> anyhow::Result<Vec<Relation>> {
    let prompt = build_relate_prompt(items, focal);
    let reply = chat_with_retry(self.provider.as_ref(), &prompt, RELATE_MAX_TOKENS, &self.retry).await?;

    let parsed: RelatedReply = serde_json::from_str(extract_json(&reply))?;
    Ok(parsed.related)
  }
}

#[derive(Deserialize)]
struct RelatedReply {
  #[serde(default)]
  related: Vec<Relation>,
}

/// Number every item so the model can cite ids back
fn format_items_for_prompt(items: &[Item]) -> String {
  items
    .iter()
    .map(|item| format!("[{}] @{}: {}", item.id, item.username, item.summary))
    .collect::<Vec<_>>()
    .join("\n")
}

fn build_relate_prompt(items: &[Item], focal: &Item) -> String {
  format!(
    r#"You are analyzing urban planning suggestions/issues from social media.

Here are all the items:
{items_text}

For item [{id}] "@{username}: {summary}"

Find the TOP 3-5 most related items from the list. Items are related if they:
- Address the same topic (housing, transit, sidewalks, safety, etc.)
- Propose complementary or conflicting solutions
- Could be combined into a larger initiative
- Share geographic focus

Respond in JSON format only:
{{
  "related": [
    {{"id": <number>, "reason": "<brief reason for relation>"}},
    ...
  ]
}}

Only include items that have meaningful connections. If fewer than 3 items are related, that's fine."#,
    items_text = format_items_for_prompt(items),
    id = focal.id,
    username = focal.username,
    summary = focal.summary,
  )
}

/// Run the configured strategy over every item, degrading to the keyword
/// strategy per item when the provider stays down. Produces raw directed
/// edges in discovery order; integrity checks happen at assembly.
pub async fn discover_edges(items: &[Item], finder: &dyn RelatedFinder) -> Vec<Edge> {
  if items.len() > CONTEXT_WINDOW_THRESHOLD {
    tracing::warn!(
      items = items.len(),
      threshold = CONTEXT_WINDOW_THRESHOLD,
      "Corpus exceeds the full-context design bound; results may degrade"
    );
  }

  let fallback = KeywordFinder;
  let mut edges = Vec::new();

  for (index, item) in items.iter().enumerate() {
    let pct = (index * 100) / items.len();
    println!(
      "[{:3}%] Processing item {}/{}: @{}...",
      pct,
      index + 1,
      items.len(),
      item.username.cyan()
    );

    let relations = match finder.find_related(items, item).await {
      Ok(relations) => relations,
      Err(e) => {
        tracing::warn!(item = item.id, error = %e, "Relevance lookup failed, using keyword fallback for this item");
        fallback.find_related(items, item).await.unwrap_or_default()
      }
    };

    for relation in relations {
      edges.push(Edge::new(item.id, relation.id, relation.reason));
    }
  }

  edges
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Item;

  fn item(id: u32, username: &str, summary: &str) -> Item {
    Item::new(id, String::new(), username.to_string(), summary.to_string(), String::new())
  }

  struct BrokenFinder;

  #[async_trait]
  impl RelatedFinder for BrokenFinder {
    fn name(&self) -> &'static str {
      "broken"
    }

    async fn find_related(&self, _items: &[Item], _focal: &Item) -> anyhow::Result<Vec<Relation>> {
      anyhow::bail!("provider unreachable")
    }
  }

  struct CannedFinder {
    relations: Vec<Relation>,
  }

  #[async_trait]
  impl RelatedFinder for CannedFinder {
    fn name(&self) -> &'static str {
      "canned"
    }

    async fn find_related(&self, _items: &[Item], focal: &Item) -> anyhow::Result<Vec<Relation>> {
      if focal.id == 1 {
        Ok(self.relations.clone())
      } else {
        Ok(Vec::new())
      }
    }
  }

  #[test]
  fn test_prompt_numbers_every_item() {
    let items = vec![item(1, "ada", "wider sidewalks"), item(2, "bob", "more bus lanes")];
    let prompt = build_relate_prompt(&items, &items[1]);
    assert!(prompt.contains("[1] @ada: wider sidewalks"));
    assert!(prompt.contains("[2] @bob: more bus lanes"));
    assert!(prompt.contains("For item [2]"));
  }

  #[test]
  fn test_reply_parses_with_missing_related_key() {
    let parsed: RelatedReply = serde_json::from_str("{}").unwrap();
    assert!(parsed.related.is_empty());
  }

  #[tokio::test]
  async fn test_discover_survives_finder_failure() {
    let items = vec![
      item(1, "ada", "wider sidewalk space downtown"),
      item(2, "bob", "every sidewalk downtown floods"),
    ];

    // Broken finder degrades to keyword overlap per item instead of aborting
    let edges = discover_edges(&items, &BrokenFinder).await;
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.reason.contains("sidewalk")));
  }

  #[tokio::test]
  async fn test_discover_collects_in_source_order() {
    let items = vec![item(1, "ada", "a"), item(2, "bob", "b"), item(3, "cy", "c")];
    let finder = CannedFinder {
      relations: vec![
        Relation { id: 3, reason: "same block".to_string() },
        Relation { id: 2, reason: "same theme".to_string() },
      ],
    };

    let edges = discover_edges(&items, &finder).await;
    assert_eq!(edges.len(), 2);
    assert_eq!((edges[0].source_id, edges[0].target_id), (1, 3));
    assert_eq!((edges[1].source_id, edges[1].target_id), (1, 2));
  }
}
