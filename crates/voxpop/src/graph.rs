use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::model::{Edge, GraphDocument, Item};

/// Assemble raw discovered edges into one graph document: referential
/// integrity enforced, unordered pairs deduplicated (first-seen reason wins),
/// nodes in ingestion order, edges in discovery order.
pub fn assemble(items: Vec<Item>, raw_edges: Vec<Edge>) -> GraphDocument {
  let known_ids: HashSet<u32> = items.iter().map(|item| item.id).collect();
  let valid = validate_edges(raw_edges, &known_ids);
  let edges = dedupe_edges(valid);
  GraphDocument::new(items, edges)
}

/// Drop edges that cite unknown ids or loop back to their own source.
/// Integrity failures are corrected and logged, never fatal.
pub fn validate_edges(edges: Vec<Edge>, known_ids: &HashSet<u32>) -> Vec<Edge> {
  edges
    .into_iter()
    .filter(|edge| {
      if edge.source_id == edge.target_id {
        tracing::warn!(id = edge.source_id, "Dropping self-referencing edge");
        return false;
      }
      if !known_ids.contains(&edge.source_id) || !known_ids.contains(&edge.target_id) {
        tracing::warn!(
          source = edge.source_id,
          target = edge.target_id,
          "Dropping edge citing unknown item id"
        );
        return false;
      }
      true
    })
    .collect()
}

/// Keep the first-seen edge per unordered pair. Idempotent: running this on
/// an already-deduplicated list returns it unchanged.
pub fn dedupe_edges(edges: Vec<Edge>) -> Vec<Edge> {
  let mut seen: HashSet<(u32, u32)> = HashSet::new();
  edges.into_iter().filter(|edge| seen.insert(edge.pair())).collect()
}

/// Write the flat edge-list table (`source_id,target_id,reason`)
pub fn write_edge_csv(doc: &GraphDocument, path: &Path) -> Result<()> {
  let mut writer = csv::Writer::from_path(path)
    .with_context(|| format!("Could not write {}", path.display()))?;

  writer.write_record(["source_id", "target_id", "reason"])?;
  for edge in &doc.edges {
    writer.write_record([
      edge.source_id.to_string(),
      edge.target_id.to_string(),
      edge.reason.clone(),
    ])?;
  }
  writer.flush()?;

  Ok(())
}
