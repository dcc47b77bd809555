use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use voxpop::config::{Config, ProviderKind};
use voxpop::model::GraphDocument;
use voxpop::provider::build_provider;
use voxpop::relate::{KeywordFinder, ProviderFinder, RelatedFinder};
use voxpop::{community, demands, graph, ingest, relate};

#[derive(Parser)]
#[command(name = "voxpop")]
#[command(
  about = "Voxpop - Citizen Suggestion Mapper\nRelationship discovery, topic clustering, and demand synthesis for suggestion corpora"
)]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Relevance/labeling backend selection
#[derive(Args)]
struct ProviderOpt {
  /// Text-understanding provider (keyword needs no credentials)
  #[arg(short, long, value_enum, default_value = "anthropic")]
  provider: ProviderKind,
}

#[derive(Subcommand)]
enum Commands {
  /// Discover relationships between suggestions in a CSV export
  Relate {
    /// Input table with columns Date, Username, Summary/Quote, Link
    input: PathBuf,
    #[command(flatten)]
    provider: ProviderOpt,
  },
  /// Detect and label topic communities in a connections document
  Topics {
    /// A connections.json produced by the relate stage
    input: PathBuf,
    #[command(flatten)]
    provider: ProviderOpt,
  },
  /// Extract demands and synthesize proposals per topic
  Enhance {
    /// A connections_with_topics.json produced by the topics stage
    input: PathBuf,
    #[command(flatten)]
    provider: ProviderOpt,
  },
  /// Run the whole pipeline: relate, topics, enhance
  Run {
    /// Input table with columns Date, Username, Summary/Quote, Link
    input: PathBuf,
    #[command(flatten)]
    provider: ProviderOpt,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(filter)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Relate { input, provider } => {
      let config = Config::resolve(provider.provider);
      run_relate(&input, &config).await?;
    }
    Commands::Topics { input, provider } => {
      let config = Config::resolve(provider.provider);
      run_topics(&input, &config).await?;
    }
    Commands::Enhance { input, provider } => {
      let config = Config::resolve(provider.provider);
      run_enhance(&input, &config).await?;
    }
    Commands::Run { input, provider } => {
      let config = Config::resolve(provider.provider);
      let mut doc = run_relate(&input, &config).await?;

      community::annotate_topics(&mut doc, build_provider(&config).as_deref(), &config.retry).await?;
      let topics_path = sibling(&input, "connections_with_topics.json");
      doc.save(&topics_path)?;
      println!("Saved topic-annotated graph to {}", topics_path.display());

      demands::enhance_topics(&mut doc, build_provider(&config).as_deref(), &config.retry).await?;
      let enhanced_path = sibling(&input, "connections_enhanced.json");
      doc.save(&enhanced_path)?;
      println!("Saved enhanced graph to {}", enhanced_path.display());
    }
  }

  Ok(())
}

async fn run_relate(input: &Path, config: &Config) -> Result<GraphDocument> {
  println!("Loading {}...", input.display());
  let items = ingest::load_items(input)?;
  println!("Loaded {} items", items.len().to_string().cyan());

  if items.len() < 2 {
    tracing::warn!("Need at least 2 items to find connections");
  }

  println!("\nFinding relations using {}...", config.provider.as_str().cyan());
  let finder: Box<dyn RelatedFinder> = match build_provider(config) {
    Some(provider) => Box::new(ProviderFinder::new(provider, config.retry.clone())),
    None => Box::new(KeywordFinder),
  };

  let edges = relate::discover_edges(&items, finder.as_ref()).await;
  let doc = graph::assemble(items, edges);

  let csv_path = sibling(input, "connections.csv");
  graph::write_edge_csv(&doc, &csv_path)?;
  println!("Saved {} connections to {}", doc.edges.len().to_string().green(), csv_path.display());

  let json_path = sibling(input, "connections.json");
  doc.save(&json_path)?;
  println!("Saved full graph to {}", json_path.display());

  Ok(doc)
}

async fn run_topics(input: &Path, config: &Config) -> Result<()> {
  let mut doc = GraphDocument::load(input)?;

  community::annotate_topics(&mut doc, build_provider(config).as_deref(), &config.retry).await?;

  let output = sibling(input, "connections_with_topics.json");
  doc.save(&output)?;
  println!("Saved topic-annotated graph to {}", output.display());
  Ok(())
}

async fn run_enhance(input: &Path, config: &Config) -> Result<()> {
  let mut doc = GraphDocument::load(input)?;

  demands::enhance_topics(&mut doc, build_provider(config).as_deref(), &config.retry).await?;

  let output = sibling(input, "connections_enhanced.json");
  doc.save(&output)?;
  println!("Saved enhanced graph to {}", output.display());
  Ok(())
}

/// Output files land beside the input file
fn sibling(input: &Path, name: &str) -> PathBuf {
  match input.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
    _ => PathBuf::from(name),
  }
}
