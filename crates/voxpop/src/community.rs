use anyhow::Result;
use colored::*;
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::RetryConfig;
use crate::model::{GraphDocument, Topic};
use crate::provider::{chat_with_retry, ChatProvider};
use crate::relate::STOP_WORDS;

const LABEL_MAX_TOKENS: u32 = 50;
// Cap the member summaries quoted in the labeling prompt
const LABEL_PROMPT_ITEMS: usize = 15;
const GAIN_EPSILON: f64 = 1e-12;

/// Partition the document's nodes into disjoint communities by greedy
/// modularity maximization (Clauset-Newman-Moore): start with one community
/// per node and keep merging the connected pair whose merge gains the most
/// modularity until no merge improves it.
///
/// Deterministic for a fixed edge ordering; ties resolve toward the earliest
/// community pair in insertion order. Isolated nodes stay singletons. The
/// result is sorted by size descending, exhaustive, and disjoint.
pub fn detect_communities(doc: &GraphDocument) -> Vec<Vec<u32>> {
  let mut graph: UnGraph<u32, ()> = UnGraph::new_undirected();
  let mut index_of = HashMap::new();

  for node in &doc.nodes {
    let idx = graph.add_node(node.id);
    index_of.insert(node.id, idx);
  }
  // Documents loaded from disk may still carry repeated pairs; each unordered
  // pair counts once or modularity skews toward the duplicated link
  let mut seen: HashSet<(u32, u32)> = HashSet::new();
  for edge in &doc.edges {
    if let (Some(&a), Some(&b)) = (index_of.get(&edge.source_id), index_of.get(&edge.target_id)) {
      if seen.insert(edge.pair()) {
        graph.add_edge(a, b, ());
      }
    }
  }

  let n = graph.node_count();
  let m = graph.edge_count();

  // Community state, indexed by the initial singleton id
  let mut members: Vec<Vec<u32>> = graph.node_indices().map(|idx| vec![graph[idx]]).collect();
  let mut active: BTreeSet<usize> = (0..n).collect();

  if m > 0 {
    // a[i]: fraction of edge ends in community i; between[(i,j)]: fraction of
    // edges joining i and j, keyed with i < j
    let mut a: Vec<f64> = vec![0.0; n];
    let mut between: HashMap<(usize, usize), f64> = HashMap::new();

    for idx in graph.node_indices() {
      a[idx.index()] = graph.edges(idx).count() as f64 / (2.0 * m as f64);
    }
    for edge in graph.edge_references() {
      let (s, t) = (edge.source().index(), edge.target().index());
      let key = if s < t { (s, t) } else { (t, s) };
      *between.entry(key).or_insert(0.0) += 1.0 / m as f64;
    }

    loop {
      let mut best: Option<((usize, usize), f64)> = None;
      for &i in &active {
        for &j in active.range((i + 1)..) {
          if let Some(&e_ij) = between.get(&(i, j)) {
            let gain = e_ij - 2.0 * a[i] * a[j];
            if best.map_or(true, |(_, best_gain)| gain > best_gain) {
              best = Some(((i, j), gain));
            }
          }
        }
      }

      let Some(((i, j), gain)) = best else { break };
      if gain <= GAIN_EPSILON {
        break;
      }

      // Merge j into i
      let absorbed = std::mem::take(&mut members[j]);
      members[i].extend(absorbed);
      a[i] += a[j];
      active.remove(&j);
      between.remove(&(i, j));

      for &k in &active {
        if k == i {
          continue;
        }
        let jk = if j < k { (j, k) } else { (k, j) };
        if let Some(weight) = between.remove(&jk) {
          let ik = if i < k { (i, k) } else { (k, i) };
          *between.entry(ik).or_insert(0.0) += weight;
        }
      }
    }
  }

  let mut communities: Vec<Vec<u32>> = active
    .into_iter()
    .map(|i| {
      let mut ids = std::mem::take(&mut members[i]);
      ids.sort();
      ids
    })
    .collect();

  // Largest first; smallest member id breaks ties so reruns agree
  communities.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
  communities
}

/// Annotate every node with its community and attach the topics array.
/// Labeling degrades from the provider to keyword frequency, never fails the
/// run.
pub async fn annotate_topics(
  doc: &mut GraphDocument,
  provider: Option<&dyn ChatProvider>,
  retry: &RetryConfig,
) -> Result<()> {
  let communities = detect_communities(doc);
  println!("Found {} communities.", communities.len().to_string().cyan());

  if provider.is_none() {
    tracing::warn!("No provider credential available, labeling topics by keyword frequency");
  }

  let mut topics = Vec::new();

  for (idx, member_ids) in communities.iter().enumerate() {
    let topic_id = idx as u32;
    let summaries: Vec<&str> = doc
      .nodes
      .iter()
      .filter(|node| member_ids.contains(&node.id))
      .map(|node| node.summary.as_str())
      .collect();

    let label = if member_ids.len() < 2 {
      "Miscellaneous".to_string()
    } else {
      println!("Labeling cluster {} ({} items)...", idx + 1, member_ids.len());
      let label = match provider {
        Some(provider) => match label_with_provider(provider, &summaries, retry).await {
          Ok(label) => label,
          Err(e) => {
            tracing::warn!(topic = topic_id, error = %e, "Topic labeling failed, using keyword label");
            keyword_label(&summaries)
          }
        },
        None => keyword_label(&summaries),
      };
      println!(" -> {}", label.yellow());
      label
    };

    for node in doc.nodes.iter_mut().filter(|node| member_ids.contains(&node.id)) {
      node.topic_id = Some(topic_id);
      node.topic_label = Some(label.clone());
    }

    topics.push(Topic {
      id: topic_id,
      label,
      count: member_ids.len(),
      color: String::new(),
      demands: Vec::new(),
      synthesized_actions: Vec::new(),
    });
  }

  doc.topics = Some(topics);
  Ok(())
}

async fn label_with_provider(
  provider: &dyn ChatProvider,
  summaries: &[&str],
  retry: &RetryConfig,
) -> Result<String> {
  let items_text = summaries
    .iter()
    .take(LABEL_PROMPT_ITEMS)
    .map(|summary| format!("- {summary}"))
    .collect::<Vec<_>>()
    .join("\n");

  let prompt = format!(
    r#"You are analyzing a cluster of urban planning suggestions.
Here are the suggestions in this cluster:
{items_text}

What is the single specific shared topic for these items?
Examples: "Bike Infrastructure", "Housing Density", "School Safety", "Public Transit".
Return ONLY the label (max 3 words)."#
  );

  let reply = chat_with_retry(provider, &prompt, LABEL_MAX_TOKENS, retry).await?;
  Ok(reply.trim().replace('"', ""))
}

/// Label a community by its two most frequent meaningful words
pub fn keyword_label(summaries: &[&str]) -> String {
  let stop_words: std::collections::HashSet<&str> = STOP_WORDS.iter().copied().collect();
  let mut counts: HashMap<String, usize> = HashMap::new();

  for summary in summaries {
    for word in summary.to_lowercase().replace(['.', ','], "").split_whitespace() {
      if word.len() > 3 && !stop_words.contains(word) {
        *counts.entry(capitalize(word)).or_insert(0) += 1;
      }
    }
  }

  if counts.is_empty() {
    return "Group".to_string();
  }

  let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
  ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

  ranked.into_iter().take(2).map(|(word, _)| word).collect::<Vec<_>>().join(" & ")
}

fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    None => String::new(),
  }
}
