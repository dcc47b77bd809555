use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::model::Item;

/// Load suggestion rows from the input table.
///
/// The export format is not RFC CSV: the `Summary/Quote` field carries
/// unquoted commas. The link column is the only reliable anchor, so each row
/// is split around the first `https://` (or `http://`) occurrence and the
/// prefix is divided on its first two commas into date and username.
///
/// Rows with an empty summary are skipped and logged. An unreadable file is
/// fatal before any output is written.
pub fn load_items(path: &Path) -> Result<Vec<Item>> {
  let content = fs::read_to_string(path)
    .with_context(|| format!("Could not read input file {}", path.display()))?;

  let mut lines = content.lines();
  // Header row: Date, Username, Summary/Quote, Link
  let _header = lines.next();

  let mut items = Vec::new();
  let mut next_id: u32 = 1;

  for line in lines {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    let (date, username, summary, link) = split_row(line);

    if summary.is_empty() {
      tracing::warn!(username = %username, "Skipping row with empty summary");
      continue;
    }

    items.push(Item::new(next_id, date, username, summary, link));
    next_id += 1;
  }

  Ok(items)
}

fn split_row(line: &str) -> (String, String, String, String) {
  let url_pos = line.find("https://").or_else(|| line.find("http://"));

  match url_pos {
    Some(pos) => {
      let before_url = line[..pos].trim_end_matches(',');
      let link = line[pos..].trim();
      let (date, username, summary) = split_prefix(before_url);
      (date, username, summary, link.to_string())
    }
    None => {
      // No link on this row; a plain comma split is the best we can do
      let parts: Vec<&str> = line.split(',').collect();
      match parts.len() {
        0 => (String::new(), String::new(), String::new(), String::new()),
        1 => (parts[0].trim().to_string(), String::new(), String::new(), String::new()),
        2 => (parts[0].trim().to_string(), parts[1].trim().to_string(), String::new(), String::new()),
        3 => (
          parts[0].trim().to_string(),
          parts[1].trim().to_string(),
          parts[2].trim().to_string(),
          String::new(),
        ),
        _ => (
          parts[0].trim().to_string(),
          parts[1].trim().to_string(),
          parts[2..parts.len() - 1].join(",").trim().to_string(),
          parts[parts.len() - 1].trim().to_string(),
        ),
      }
    }
  }
}

/// Split `Date,Username,Summary` on the first two commas; the summary keeps
/// any further commas intact
fn split_prefix(before_url: &str) -> (String, String, String) {
  match before_url.split_once(',') {
    Some((date, rest)) => match rest.split_once(',') {
      Some((username, summary)) => {
        (date.trim().to_string(), username.trim().to_string(), summary.trim().to_string())
      }
      None => (date.trim().to_string(), rest.trim().to_string(), String::new()),
    },
    None => (before_url.trim().to_string(), String::new(), String::new()),
  }
}
