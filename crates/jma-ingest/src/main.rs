//! `jma`: load the area taxonomy, ingest JMA forecasts and query them.
//!
//! # Usage
//!
//! ```text
//! jma load-areas
//! jma ingest --area 130000 --area 140000
//! jma children 関東甲信地方
//! jma query --area 130010 --category weather --from 2024-01-15T00:00:00+09:00
//! ```
//!
//! Settings come from `jma.toml` (or `--config`) and `JMA_*` environment
//! variables; flags override both.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use jma_core::{
  area::AreaIndex,
  forecast::Category,
  store::{ForecastStore, TimeWindow},
};
use jma_feed::HttpFeed;
use jma_ingest::{IngestConfig, Pipeline, source_codes};
use jma_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "jma", version, about = "JMA forecast feed to SQLite")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "jma.toml")]
  config: PathBuf,

  /// SQLite database path.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  /// Area taxonomy JSON (`area.json`).
  #[arg(long, value_name = "FILE")]
  taxonomy: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load the taxonomy, report inconsistencies and persist it.
  LoadAreas,

  /// Fetch, normalize and store forecasts.
  Ingest {
    /// Area code to ingest; repeatable. Defaults to every stored office.
    #[arg(long = "area", value_name = "CODE")]
    areas: Vec<String>,

    /// Areas fetched at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Keep facts for codes outside the taxonomy (observation points).
    #[arg(long)]
    admit_unknown_areas: bool,
  },

  /// Print the office names under a region.
  Children {
    region: String,
  },

  /// Print stored facts as JSON lines, ordered by target time.
  Query {
    #[arg(long, value_name = "CODE")]
    area: String,

    /// Category to include; repeatable. Defaults to all.
    #[arg(long = "category", value_name = "CATEGORY")]
    categories: Vec<Category>,

    /// Inclusive lower bound (RFC 3339).
    #[arg(long)]
    from: Option<DateTime<FixedOffset>>,

    /// Exclusive upper bound (RFC 3339).
    #[arg(long)]
    to: Option<DateTime<FixedOffset>>,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = IngestConfig::load(&cli.config)
    .with_context(|| format!("failed to read config {}", cli.config.display()))?;
  if let Some(store) = cli.store {
    cfg.store_path = store;
  }
  if let Some(taxonomy) = cli.taxonomy {
    cfg.taxonomy_path = taxonomy;
  }

  match cli.command {
    Command::LoadAreas => load_areas(&cfg).await,
    Command::Ingest { areas, concurrency, admit_unknown_areas } => {
      if !areas.is_empty() {
        cfg.area_codes = Some(areas);
      }
      if let Some(concurrency) = concurrency {
        cfg.concurrency = concurrency;
      }
      cfg.admit_unknown_areas |= admit_unknown_areas;
      ingest(&cfg).await
    }
    Command::Children { region } => children(&cfg, &region),
    Command::Query { area, categories, from, to } => {
      let window = TimeWindow {
        start: from.map(|t| t.to_utc()),
        end:   to.map(|t| t.to_utc()),
      };
      query(&cfg, &area, &categories, &window).await
    }
  }
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn load_areas(cfg: &IngestConfig) -> anyhow::Result<()> {
  let index = read_index(&cfg.taxonomy_path)?;
  for problem in index.validate() {
    tracing::warn!("taxonomy inconsistency: {problem}");
  }

  let store = open_store(cfg).await?;
  let added = store
    .store_areas(&index)
    .await
    .context("failed to store area taxonomy")?;

  println!("stored {added} new areas ({} in taxonomy)", index.len());
  Ok(())
}

async fn ingest(cfg: &IngestConfig) -> anyhow::Result<()> {
  let index = read_index(&cfg.taxonomy_path)?;
  let store = open_store(cfg).await?;
  let codes = source_codes(&store, &index, cfg.area_codes.clone())
    .await
    .context("failed to determine area codes")?;

  let feed = HttpFeed::new(cfg.feed_config()).context("failed to build HTTP client")?;
  tracing::info!(areas = codes.len(), concurrency = cfg.concurrency, "starting ingestion");

  let summary = Pipeline::new(store, feed, index, cfg.normalize_options())
    .with_concurrency(cfg.concurrency)
    .run(codes)
    .await
    .context("ingestion aborted")?;

  print!("{summary}");
  Ok(())
}

fn children(cfg: &IngestConfig, region: &str) -> anyhow::Result<()> {
  let index = read_index(&cfg.taxonomy_path)?;
  let names = index.resolve_children(region);
  if names.is_empty() {
    tracing::warn!(region, "no offices found under region");
  }
  for name in names {
    println!("{name}");
  }
  Ok(())
}

async fn query(
  cfg: &IngestConfig,
  area: &str,
  categories: &[Category],
  window: &TimeWindow,
) -> anyhow::Result<()> {
  let store = open_store(cfg).await?;
  let facts = store
    .query_range(area, categories, window)
    .await
    .context("query failed")?;

  for fact in &facts {
    println!("{}", serde_json::to_string(fact)?);
  }
  Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn read_index(path: &Path) -> anyhow::Result<AreaIndex> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading taxonomy {}", path.display()))?;
  AreaIndex::from_json_str(&raw).with_context(|| format!("parsing taxonomy {}", path.display()))
}

async fn open_store(cfg: &IngestConfig) -> anyhow::Result<SqliteStore> {
  let path = expand_tilde(&cfg.store_path);
  SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
