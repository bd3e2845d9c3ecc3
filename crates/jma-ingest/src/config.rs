//! Runtime configuration, layered from an optional TOML file and `JMA_*`
//! environment variables.

use std::{path::{Path, PathBuf}, time::Duration};

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use jma_core::normalize::NormalizeOptions;
use jma_feed::{DEFAULT_BASE_URL, FeedConfig};
use serde::Deserialize;

use crate::Result;

/// Settings for the `jma` binary. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub store_path:           PathBuf,
  pub taxonomy_path:        PathBuf,
  pub feed_base_url:        String,
  pub request_timeout_secs: u64,
  /// Areas fetched at once; `1` processes codes strictly in order.
  pub concurrency:          usize,
  /// Explicit codes to ingest. When absent, the office-level codes of the
  /// stored taxonomy are used. Only settable from the file or the CLI.
  pub area_codes:           Option<Vec<String>>,
  pub admit_unknown_areas:  bool,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      store_path:           PathBuf::from("weather.db"),
      taxonomy_path:        PathBuf::from("area.json"),
      feed_base_url:        DEFAULT_BASE_URL.to_owned(),
      request_timeout_secs: 30,
      concurrency:          1,
      area_codes:           None,
      admit_unknown_areas:  false,
    }
  }
}

impl IngestConfig {
  /// Read `path` if it exists, then apply `JMA_*` overrides.
  pub fn load(path: &Path) -> Result<Self> {
    Self::from_builder(Config::builder().add_source(File::from(path).required(false)))
  }

  fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
    let settings = builder
      .add_source(Environment::with_prefix("JMA"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn feed_config(&self) -> FeedConfig {
    FeedConfig {
      base_url: self.feed_base_url.clone(),
      timeout:  Duration::from_secs(self.request_timeout_secs),
    }
  }

  pub fn normalize_options(&self) -> NormalizeOptions {
    NormalizeOptions { admit_unknown_areas: self.admit_unknown_areas }
  }
}

#[cfg(test)]
mod tests {
  use config::FileFormat;

  use super::*;

  fn parse(toml: &str) -> IngestConfig {
    IngestConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
      .unwrap()
  }

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = IngestConfig::load(Path::new("/nonexistent/jma.toml")).unwrap();
    assert_eq!(cfg.concurrency, 1);
    assert_eq!(cfg.request_timeout_secs, 30);
    assert_eq!(cfg.feed_base_url, DEFAULT_BASE_URL);
    assert!(cfg.area_codes.is_none());
  }

  #[test]
  fn file_values_override_defaults() {
    let cfg = parse(
      r#"
        store_path = "/tmp/forecast.db"
        concurrency = 4
        area_codes = ["130000", "140000"]
        admit_unknown_areas = true
      "#,
    );
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/forecast.db"));
    assert_eq!(cfg.concurrency, 4);
    assert_eq!(cfg.area_codes.as_deref(), Some(&["130000".to_owned(), "140000".to_owned()][..]));
    assert!(cfg.normalize_options().admit_unknown_areas);
    assert_eq!(cfg.taxonomy_path, PathBuf::from("area.json"));
  }

  #[test]
  fn feed_config_carries_timeout() {
    let cfg = parse("request_timeout_secs = 5\nfeed_base_url = \"http://localhost:8080\"");
    let feed = cfg.feed_config();
    assert_eq!(feed.timeout, Duration::from_secs(5));
    assert_eq!(feed.base_url, "http://localhost:8080");
  }
}
