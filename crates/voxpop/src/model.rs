use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One ingested suggestion. Ids are assigned in ingestion order, starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
  pub id: u32,
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub username: String,
  pub summary: String,
  #[serde(default)]
  pub link: String,

  // Filled in by community detection; absent in earlier pipeline stages
  #[serde(skip_serializing_if = "Option::is_none")]
  pub topic_id: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub topic_label: Option<String>,
}

impl Item {
  pub fn new(id: u32, date: String, username: String, summary: String, link: String) -> Self {
    Self { id, date, username, summary, link, topic_id: None, topic_label: None }
  }
}

/// One discovered relationship. Directed as produced, undirected for algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
  pub source_id: u32,
  pub target_id: u32,
  pub reason: String,
}

impl Edge {
  pub fn new(source_id: u32, target_id: u32, reason: String) -> Self {
    Self { source_id, target_id, reason }
  }

  /// The unordered endpoint pair, for deduplication
  pub fn pair(&self) -> (u32, u32) {
    if self.source_id <= self.target_id {
      (self.source_id, self.target_id)
    } else {
      (self.target_id, self.source_id)
    }
  }
}

/// A deduplicated actionable statement extracted from one or more items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demand {
  pub description: String,
  pub supporting_item_ids: Vec<u32>,
  pub voice_count: usize,
}

/// A higher-order policy proposal combining one or more demands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAction {
  pub title: String,
  pub proposal: String,
  pub supporting_demand_descriptions: Vec<String>,
  pub voices_represented: usize,
}

/// Community metadata, one entry per detected topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
  pub id: u32,
  pub label: String,
  pub count: usize,
  /// Assigned by the frontend
  #[serde(default)]
  pub color: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub demands: Vec<Demand>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub synthesized_actions: Vec<SynthesizedAction>,
}

/// The serialized unit of work passed between pipeline stages. Later stages
/// append fields but never restructure what earlier stages wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
  pub nodes: Vec<Item>,
  pub edges: Vec<Edge>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub topics: Option<Vec<Topic>>,
}

impl GraphDocument {
  pub fn new(nodes: Vec<Item>, edges: Vec<Edge>) -> Self {
    Self { nodes, edges, topics: None }
  }

  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content)
      .map_err(|e| anyhow!("Invalid graph document {}: {}", path.display(), e))
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(self)?;
    fs::write(path, json)
      .with_context(|| format!("Could not write {}", path.display()))?;
    Ok(())
  }
}
