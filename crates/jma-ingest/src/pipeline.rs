//! The ingestion pipeline.
//!
//! ```text
//! area codes
//!   └─ FeedSource::fetch        → ForecastDocument | FetchError (area skipped)
//!        └─ Normalizer          → per-report fact batches
//!             └─ upsert_office  → office id (serialised)
//!                  └─ insert_facts
//! ```
//!
//! Each area is independently idempotent, so a run can be interrupted between
//! areas and simply re-run.

use std::{
  collections::{BTreeSet, HashMap},
  fmt,
  sync::Arc,
};

use jma_core::{
  area::{AreaIndex, AreaLevel},
  normalize::{NormalizeOptions, Normalizer},
  store::{ForecastStore, InsertSummary, OfficeId},
};
use jma_feed::{FeedSource, FetchError};
use tokio::{sync::Mutex, task::JoinSet};

use crate::{Error, Result};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What one successfully fetched area contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaReport {
  pub writes:              InsertSummary,
  pub unrecognized_series: usize,
  pub unresolved_areas:    BTreeSet<String>,
  pub malformed_reports:   usize,
  /// Facts merged because an earlier report of the same document already
  /// carried their key.
  pub overlapping_facts:   usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaOutcome {
  pub area_code: String,
  pub result:    std::result::Result<AreaReport, FetchError>,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
  pub succeeded:           usize,
  /// Areas skipped because their document could not be fetched, by code.
  pub failed:              Vec<(String, FetchError)>,
  pub writes:              InsertSummary,
  pub unrecognized_series: usize,
  pub unresolved_areas:    BTreeSet<String>,
  pub malformed_reports:   usize,
  /// Facts merged because an earlier report of the same document already
  /// carried their key.
  pub overlapping_facts:   usize,
}

impl RunSummary {
  fn record(&mut self, outcome: AreaOutcome) {
    match outcome.result {
      Ok(report) => {
        self.succeeded += 1;
        self.writes += report.writes;
        self.unrecognized_series += report.unrecognized_series;
        self.unresolved_areas.extend(report.unresolved_areas);
        self.malformed_reports += report.malformed_reports;
        self.overlapping_facts += report.overlapping_facts;
      }
      Err(err) => self.failed.push((outcome.area_code, err)),
    }
  }

  pub fn areas(&self) -> usize { self.succeeded + self.failed.len() }
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "areas: {} succeeded, {} failed",
      self.succeeded,
      self.failed.len()
    )?;
    writeln!(
      f,
      "rows:  {} inserted, {} updated, {} deduplicated",
      self.writes.inserted, self.writes.updated, self.writes.deduplicated
    )?;
    if self.unrecognized_series + self.malformed_reports > 0 {
      writeln!(
        f,
        "skipped: {} unrecognized series, {} malformed reports",
        self.unrecognized_series, self.malformed_reports
      )?;
    }
    if self.overlapping_facts > 0 {
      writeln!(
        f,
        "merged: {} facts repeated across reports of one document",
        self.overlapping_facts
      )?;
    }
    if !self.unresolved_areas.is_empty() {
      let codes: Vec<&str> = self.unresolved_areas.iter().map(String::as_str).collect();
      writeln!(f, "unresolved area codes: {}", codes.join(", "))?;
    }
    for (code, err) in &self.failed {
      writeln!(f, "  {code}: {err}")?;
    }
    Ok(())
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

struct Shared<S, F> {
  store:     S,
  feed:      F,
  index:     AreaIndex,
  normalize: NormalizeOptions,
  /// Office ids seen this run. Holding the lock across the upsert keeps a
  /// single writer on `publishing_offices`.
  offices:   Mutex<HashMap<String, OfficeId>>,
}

/// Drives area codes through fetch, normalize and store.
///
/// Cloning is cheap; clones share the store, feed and office cache.
pub struct Pipeline<S, F> {
  shared:      Arc<Shared<S, F>>,
  concurrency: usize,
}

impl<S, F> Clone for Pipeline<S, F> {
  fn clone(&self) -> Self {
    Self { shared: Arc::clone(&self.shared), concurrency: self.concurrency }
  }
}

impl<S, F> Pipeline<S, F>
where
  S: ForecastStore + 'static,
  F: FeedSource + 'static,
{
  pub fn new(store: S, feed: F, index: AreaIndex, normalize: NormalizeOptions) -> Self {
    Self {
      shared:      Arc::new(Shared {
        store,
        feed,
        index,
        normalize,
        offices: Mutex::new(HashMap::new()),
      }),
      concurrency: 1,
    }
  }

  /// Areas processed at once; values below 1 mean 1.
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  pub fn store(&self) -> &S { &self.shared.store }

  /// Ingest every code in `codes`.
  ///
  /// With a concurrency of 1 codes are processed in order. Otherwise up to
  /// `concurrency` areas are in flight and `failed` is sorted by code.
  pub async fn run<I>(&self, codes: I) -> Result<RunSummary>
  where
    I: IntoIterator<Item = String>,
  {
    let mut summary = RunSummary::default();

    if self.concurrency == 1 {
      for code in codes {
        summary.record(self.shared.ingest_area(code).await?);
      }
    } else {
      let mut tasks = JoinSet::new();
      for code in codes {
        if tasks.len() >= self.concurrency
          && let Some(joined) = tasks.join_next().await
        {
          summary.record(joined??);
        }
        let shared = Arc::clone(&self.shared);
        tasks.spawn(async move { shared.ingest_area(code).await });
      }
      while let Some(joined) = tasks.join_next().await {
        summary.record(joined??);
      }
      summary.failed.sort_by(|a, b| a.0.cmp(&b.0));
    }

    tracing::info!(
      succeeded = summary.succeeded,
      failed = summary.failed.len(),
      inserted = summary.writes.inserted,
      updated = summary.writes.updated,
      deduplicated = summary.writes.deduplicated,
      "ingestion run finished"
    );
    Ok(summary)
  }
}

impl<S, F> Shared<S, F>
where
  S: ForecastStore,
  F: FeedSource,
{
  async fn ingest_area(&self, area_code: String) -> Result<AreaOutcome> {
    let document = match self.feed.fetch(&area_code).await {
      Ok(document) => document,
      Err(err) => {
        tracing::warn!(area = %area_code, error = %err, "fetch failed; skipping area");
        return Ok(AreaOutcome { area_code, result: Err(err) });
      }
    };

    let normalized = Normalizer::with_options(&self.index, self.normalize).normalize(&document);
    if normalized.malformed_reports > 0 {
      tracing::warn!(
        area = %area_code,
        malformed = normalized.malformed_reports,
        "document contained malformed reports"
      );
    }
    if !normalized.unresolved_areas.is_empty() {
      tracing::debug!(
        area = %area_code,
        codes = ?normalized.unresolved_areas,
        "dropped facts for area codes outside the taxonomy"
      );
    }

    let mut writes = InsertSummary::default();
    for report in &normalized.reports {
      let office = self.office_id(&report.publishing_office).await?;
      writes += self
        .store
        .insert_facts(office, &report.facts)
        .await
        .map_err(Error::store)?;
    }

    tracing::info!(
      area = %area_code,
      inserted = writes.inserted,
      updated = writes.updated,
      deduplicated = writes.deduplicated,
      "ingested area"
    );

    Ok(AreaOutcome {
      area_code,
      result: Ok(AreaReport {
        writes,
        unrecognized_series: normalized.unrecognized_series,
        unresolved_areas: normalized.unresolved_areas,
        malformed_reports: normalized.malformed_reports,
        overlapping_facts: normalized.overlapping_facts,
      }),
    })
  }

  async fn office_id(&self, name: &str) -> Result<OfficeId> {
    let mut offices = self.offices.lock().await;
    if let Some(id) = offices.get(name) {
      return Ok(*id);
    }
    let id = self.store.upsert_office(name).await.map_err(Error::store)?;
    offices.insert(name.to_owned(), id);
    Ok(id)
  }
}

// ─── Area-code source list ───────────────────────────────────────────────────

/// The codes a run should fetch.
///
/// Explicit codes win. Otherwise the office-level codes persisted in the
/// store's `area` table are used, falling back to the offices of `index` when
/// the taxonomy has not been stored yet.
pub async fn source_codes<S: ForecastStore>(
  store: &S,
  index: &AreaIndex,
  explicit: Option<Vec<String>>,
) -> Result<Vec<String>> {
  if let Some(codes) = explicit.filter(|c| !c.is_empty()) {
    return Ok(codes);
  }

  let stored = store
    .area_codes(Some(AreaLevel::Office))
    .await
    .map_err(Error::store)?;
  if !stored.is_empty() {
    return Ok(stored);
  }

  tracing::debug!("no stored taxonomy; taking office codes from the area index");
  Ok(index.codes_at(AreaLevel::Office))
}
