use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::{Relation, RelatedFinder};
use crate::model::Item;

/// Keyword-overlap relevance strategy. Fully deterministic: identical input
/// texts always produce identical relations, with no network access.
pub struct KeywordFinder;

const TOP_K: usize = 5;
const MIN_TOKEN_LEN: usize = 3;

/// Frequent English words plus domain noise (place names, filler verbs) that
/// carry no topical signal for suggestion texts
pub const STOP_WORDS: &[&str] = &[
  "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "have", "has",
  "had", "but", "not", "you", "your", "our", "their", "they", "them", "his", "her", "its",
  "into", "onto", "about", "after", "before", "over", "under", "between", "across",
  "more", "less", "than", "then", "also", "will", "would", "could", "should", "can", "may",
  "might", "just", "like", "time", "year", "month", "city", "new", "york", "san", "francisco",
  "make", "need", "want", "much", "many", "some", "most", "other", "same", "very", "really",
];

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9']+").unwrap());

/// Extract topical keywords from a summary: lowercase alphanumeric runs,
/// edge apostrophes trimmed, short tokens and stop words dropped
pub fn tokenize_summary(text: &str) -> HashSet<String> {
  let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
  let lowered = text.to_lowercase();

  TOKEN_RE
    .find_iter(&lowered)
    .map(|token| token.as_str().trim_matches('\'').to_string())
    .filter(|token| token.len() >= MIN_TOKEN_LEN && !stop_words.contains(token.as_str()))
    .collect()
}

/// Rank every other item by keyword overlap with the focal item and keep the
/// strongest matches
pub fn find_by_overlap(items: &[Item], focal: &Item) -> Vec<Relation> {
  let focal_tokens = tokenize_summary(&focal.summary);
  if focal_tokens.is_empty() {
    return Vec::new();
  }

  let mut scored: Vec<(f32, Vec<String>, u32)> = Vec::new();

  for item in items {
    if item.id == focal.id {
      continue;
    }

    let candidate_tokens = tokenize_summary(&item.summary);
    if candidate_tokens.is_empty() {
      continue;
    }

    let mut overlap: Vec<String> =
      focal_tokens.intersection(&candidate_tokens).cloned().collect();
    if overlap.is_empty() {
      continue;
    }
    overlap.sort();

    let score = overlap.len() as f32 / focal_tokens.len().min(candidate_tokens.len()) as f32;
    scored.push((score, overlap, item.id));
  }

  // Stable ranking: strongest overlap first, lowest id breaks ties
  scored.sort_by(|a, b| {
    b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.2.cmp(&b.2))
  });
  scored.truncate(TOP_K);

  scored
    .into_iter()
    .map(|(_, overlap, id)| Relation {
      id,
      reason: format!("Shares keywords: {}", overlap.join(", ")),
    })
    .collect()
}

#[async_trait]
impl RelatedFinder for KeywordFinder {
  fn name(&self) -> &'static str {
    "keyword"
  }

  async fn find_related(&self, items: &[Item], focal: &Item) -> anyhow::Result<Vec<Relation>> {
    Ok(find_by_overlap(items, focal))
  }
}
