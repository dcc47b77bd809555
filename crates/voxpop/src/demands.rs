use anyhow::{anyhow, Result};
use colored::*;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::config::RetryConfig;
use crate::model::{Demand, GraphDocument, Item, SynthesizedAction};
use crate::provider::{chat_with_retry, extract_json, ChatProvider};

const DEMANDS_MAX_TOKENS: u32 = 2048;
const ACTIONS_MAX_TOKENS: u32 = 2048;
const MAX_ACTIONS: usize = 3;

/// For every topic, extract deduplicated demands and synthesize policy
/// proposals. Provider failures leave the topic's lists empty; nothing here
/// can abort the run.
pub async fn enhance_topics(
  doc: &mut GraphDocument,
  provider: Option<&dyn ChatProvider>,
  retry: &RetryConfig,
) -> Result<()> {
  let Some(mut topics) = doc.topics.take() else {
    return Err(anyhow!("Document has no topics; run topic detection first"));
  };

  let Some(provider) = provider else {
    tracing::warn!("No provider credential available, skipping demand synthesis");
    doc.topics = Some(topics);
    return Ok(());
  };

  for topic in topics.iter_mut() {
    let members: Vec<&Item> = doc
      .nodes
      .iter()
      .filter(|node| node.topic_id == Some(topic.id))
      .collect();
    if members.is_empty() {
      continue;
    }

    println!(
      "Synthesizing demands for {} ({} items)...",
      topic.label.yellow(),
      members.len()
    );

    let demands = match extract_demands(provider, &topic.label, &members, retry).await {
      Ok(demands) => demands,
      Err(e) => {
        tracing::warn!(topic = topic.id, error = %e, "Demand extraction failed, leaving topic empty");
        continue;
      }
    };

    if demands.is_empty() {
      continue;
    }

    let actions = match synthesize_actions(provider, &topic.label, &demands, retry).await {
      Ok(actions) => actions,
      Err(e) => {
        tracing::warn!(topic = topic.id, error = %e, "Action synthesis failed, keeping demands only");
        Vec::new()
      }
    };

    topic.demands = demands;
    topic.synthesized_actions = actions;
  }

  doc.topics = Some(topics);
  Ok(())
}

/// Ask the provider for distinct actionable statements across the community's
/// items, then normalize: supporting ids must belong to the community, and a
/// demand's voice count is always recomputed from its surviving supporters.
async fn extract_demands(
  provider: &dyn ChatProvider,
  topic_label: &str,
  members: &[&Item],
  retry: &RetryConfig,
) -> Result<Vec<Demand>> {
  let prompt = build_demands_prompt(topic_label, members);
  let reply = chat_with_retry(provider, &prompt, DEMANDS_MAX_TOKENS, retry).await?;
  let parsed: DemandsReply = serde_json::from_str(extract_json(&reply))?;

  let member_ids: HashSet<u32> = members.iter().map(|item| item.id).collect();
  Ok(normalize_demands(parsed.demands, &member_ids))
}

/// Validation shared by tests: drop foreign supporter ids, drop demands left
/// with no supporters, recompute voice counts
pub fn normalize_demands(raw: Vec<RawDemand>, member_ids: &HashSet<u32>) -> Vec<Demand> {
  raw
    .into_iter()
    .filter_map(|raw| {
      let mut seen = HashSet::new();
      let supporting: Vec<u32> = raw
        .supporting_item_ids
        .into_iter()
        .filter(|id| {
          let known = member_ids.contains(id);
          if !known {
            tracing::warn!(item = id, demand = %raw.description, "Dropping supporter id outside the community");
          }
          known && seen.insert(*id)
        })
        .collect();

      if supporting.is_empty() || raw.description.trim().is_empty() {
        return None;
      }

      Some(Demand {
        description: raw.description.trim().to_string(),
        voice_count: supporting.len(),
        supporting_item_ids: supporting,
      })
    })
    .collect()
}

/// Ask for 1-3 combined proposals weighted toward the highest-voice demands.
/// `voices_represented` is summed from the demands each proposal actually
/// cites; descriptions we cannot match contribute nothing.
async fn synthesize_actions(
  provider: &dyn ChatProvider,
  topic_label: &str,
  demands: &[Demand],
  retry: &RetryConfig,
) -> Result<Vec<SynthesizedAction>> {
  let prompt = build_actions_prompt(topic_label, demands);
  let reply = chat_with_retry(provider, &prompt, ACTIONS_MAX_TOKENS, retry).await?;
  let parsed: ActionsReply = serde_json::from_str(extract_json(&reply))?;

  Ok(resolve_actions(parsed.actions, demands))
}

pub fn resolve_actions(raw: Vec<RawAction>, demands: &[Demand]) -> Vec<SynthesizedAction> {
  let voices_by_description: HashMap<&str, usize> = demands
    .iter()
    .map(|demand| (demand.description.as_str(), demand.voice_count))
    .collect();

  raw
    .into_iter()
    .take(MAX_ACTIONS)
    .filter(|raw| !raw.title.trim().is_empty() && !raw.proposal.trim().is_empty())
    .map(|raw| {
      let voices_represented = raw
        .supporting_demand_descriptions
        .iter()
        .filter_map(|description| voices_by_description.get(description.trim()).copied())
        .sum();

      SynthesizedAction {
        title: raw.title.trim().to_string(),
        proposal: raw.proposal.trim().to_string(),
        supporting_demand_descriptions: raw.supporting_demand_descriptions,
        voices_represented,
      }
    })
    .collect()
}

fn build_demands_prompt(topic_label: &str, members: &[&Item]) -> String {
  let items_text = members
    .iter()
    .map(|item| format!("[{}] @{}: {}", item.id, item.username, item.summary))
    .collect::<Vec<_>>()
    .join("\n");

  format!(
    r#"You are analyzing citizen suggestions grouped under the topic "{topic_label}".

Here are the items in this group:
{items_text}

Identify the distinct actionable demands these citizens are making. Merge
semantically identical suggestions from different items into a single demand.
Skip items with no actionable content.

Respond in JSON format only:
{{
  "demands": [
    {{"description": "<normalized demand statement>", "supporting_item_ids": [<number>, ...]}},
    ...
  ]
}}"#
  )
}

fn build_actions_prompt(topic_label: &str, demands: &[Demand]) -> String {
  let demands_text = demands
    .iter()
    .map(|demand| format!("- ({} voices) {}", demand.voice_count, demand.description))
    .collect::<Vec<_>>()
    .join("\n");

  format!(
    r#"You are drafting policy proposals for the topic "{topic_label}".

These are the demands citizens raised, with how many voices support each:
{demands_text}

Propose 1-3 concrete actions that combine the highest-support demands. Every
proposal must name a concrete mechanism, number, or timeline (e.g. "convert 5
miles of curb lane by Q3"). Quote supporting demands verbatim.

Respond in JSON format only:
{{
  "actions": [
    {{"title": "<short name>", "proposal": "<concrete proposal>", "supporting_demand_descriptions": ["<verbatim demand>", ...]}},
    ...
  ]
}}"#
  )
}

#[derive(Debug, Deserialize)]
pub struct RawDemand {
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub supporting_item_ids: Vec<u32>,
}

#[derive(Deserialize)]
struct DemandsReply {
  #[serde(default)]
  demands: Vec<RawDemand>,
}

#[derive(Debug, Deserialize)]
pub struct RawAction {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub proposal: String,
  #[serde(default)]
  pub supporting_demand_descriptions: Vec<String>,
}

#[derive(Deserialize)]
struct ActionsReply {
  #[serde(default)]
  actions: Vec<RawAction>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw_demand(description: &str, ids: &[u32]) -> RawDemand {
    RawDemand { description: description.to_string(), supporting_item_ids: ids.to_vec() }
  }

  #[test]
  fn test_voice_count_matches_supporters() {
    let member_ids: HashSet<u32> = [1, 2, 3].into();
    let demands = normalize_demands(vec![raw_demand("widen sidewalks", &[1, 3])], &member_ids);

    assert_eq!(demands.len(), 1);
    assert_eq!(demands[0].voice_count, demands[0].supporting_item_ids.len());
    assert_eq!(demands[0].voice_count, 2);
  }

  #[test]
  fn test_foreign_supporters_are_dropped() {
    let member_ids: HashSet<u32> = [1, 2].into();
    let demands = normalize_demands(vec![raw_demand("widen sidewalks", &[1, 999])], &member_ids);

    assert_eq!(demands[0].supporting_item_ids, vec![1]);
    assert_eq!(demands[0].voice_count, 1);
  }

  #[test]
  fn test_unsupported_demands_are_discarded() {
    let member_ids: HashSet<u32> = [1, 2].into();
    let demands = normalize_demands(
      vec![raw_demand("phantom demand", &[7, 8]), raw_demand("", &[1])],
      &member_ids,
    );
    assert!(demands.is_empty());
  }

  #[test]
  fn test_actions_sum_matched_voices_only() {
    let demands = vec![
      Demand { description: "widen sidewalks".to_string(), supporting_item_ids: vec![1, 2], voice_count: 2 },
      Demand { description: "plant trees".to_string(), supporting_item_ids: vec![3], voice_count: 1 },
    ];

    let raw = vec![RawAction {
      title: "Complete streets".to_string(),
      proposal: "Rebuild 10 corridors by 2027".to_string(),
      supporting_demand_descriptions: vec![
        "widen sidewalks".to_string(),
        "something the model invented".to_string(),
      ],
    }];

    let actions = resolve_actions(raw, &demands);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].voices_represented, 2);
  }

  #[test]
  fn test_actions_are_capped_at_three() {
    let demands = vec![Demand {
      description: "more buses".to_string(),
      supporting_item_ids: vec![1],
      voice_count: 1,
    }];

    let raw: Vec<RawAction> = (0..5)
      .map(|i| RawAction {
        title: format!("Action {i}"),
        proposal: "Add 20 buses within 12 months".to_string(),
        supporting_demand_descriptions: vec!["more buses".to_string()],
      })
      .collect();

    assert_eq!(resolve_actions(raw, &demands).len(), 3);
  }

  #[tokio::test]
  async fn test_enhance_requires_topics() {
    let mut doc = GraphDocument::new(vec![], vec![]);
    let result = enhance_topics(&mut doc, None, &RetryConfig::default()).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_enhance_without_provider_keeps_document_intact() {
    let mut item = Item::new(1, String::new(), "ada".to_string(), "more benches".to_string(), String::new());
    item.topic_id = Some(0);
    item.topic_label = Some("Benches".to_string());
    let mut doc = GraphDocument::new(vec![item], vec![]);
    doc.topics = Some(vec![crate::model::Topic {
      id: 0,
      label: "Benches".to_string(),
      count: 1,
      color: String::new(),
      demands: Vec::new(),
      synthesized_actions: Vec::new(),
    }]);

    enhance_topics(&mut doc, None, &RetryConfig::default()).await.unwrap();

    let topics = doc.topics.as_ref().unwrap();
    assert_eq!(topics.len(), 1);
    assert!(topics[0].demands.is_empty());
    assert!(topics[0].synthesized_actions.is_empty());
  }
}
