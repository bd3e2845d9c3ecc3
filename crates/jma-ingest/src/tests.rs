//! Pipeline tests against a scripted feed and an in-memory store.

use std::collections::HashMap;

use jma_core::{
  area::AreaIndex,
  document::ForecastDocument,
  forecast::Category,
  normalize::NormalizeOptions,
  store::{ForecastStore, InsertSummary},
};
use jma_feed::{FeedSource, FetchError};
use jma_store_sqlite::SqliteStore;

use crate::{Pipeline, RunSummary, source_codes};

const TAXONOMY: &str = include_str!("../../jma-core/fixtures/taxonomy.json");
const FORECAST: &str = include_str!("../../jma-core/fixtures/forecast_130000.json");

/// Serves canned bodies by area code; unknown codes are 404s.
#[derive(Default)]
struct ScriptedFeed {
  responses: HashMap<String, Result<&'static str, FetchError>>,
}

impl ScriptedFeed {
  fn body(mut self, code: &str, body: &'static str) -> Self {
    self.responses.insert(code.to_owned(), Ok(body));
    self
  }

  fn failure(mut self, code: &str, err: FetchError) -> Self {
    self.responses.insert(code.to_owned(), Err(err));
    self
  }
}

impl FeedSource for ScriptedFeed {
  async fn fetch(&self, area_code: &str) -> Result<ForecastDocument, FetchError> {
    match self.responses.get(area_code) {
      Some(Ok(body)) => Ok(ForecastDocument::from_json_str(body)?),
      Some(Err(err)) => Err(err.clone()),
      None => Err(FetchError::Http { status_code: 404 }),
    }
  }
}

fn index() -> AreaIndex { AreaIndex::from_json_str(TAXONOMY).unwrap() }

async fn pipeline(feed: ScriptedFeed) -> Pipeline<SqliteStore, ScriptedFeed> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Pipeline::new(store, feed, index(), NormalizeOptions::default())
}

fn owned(codes: &[&str]) -> Vec<String> { codes.iter().map(|c| c.to_string()).collect() }

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingests_one_area() {
  let p = pipeline(ScriptedFeed::default().body("130000", FORECAST)).await;

  let summary = p.run(owned(&["130000"])).await.unwrap();

  assert_eq!(summary.succeeded, 1);
  assert!(summary.failed.is_empty());
  assert_eq!(summary.writes, InsertSummary { inserted: 17, updated: 0, deduplicated: 0 });
  assert_eq!(summary.unrecognized_series, 1);
  assert_eq!(summary.unresolved_areas.iter().collect::<Vec<_>>(), ["44132"]);
  assert_eq!(p.store().count(Category::Weather).await.unwrap(), 6);
  assert_eq!(p.store().count(Category::Weekly).await.unwrap(), 3);
}

#[tokio::test]
async fn reingesting_adds_no_rows() {
  let p = pipeline(ScriptedFeed::default().body("130000", FORECAST)).await;

  p.run(owned(&["130000"])).await.unwrap();
  let again = p.run(owned(&["130000"])).await.unwrap();

  assert_eq!(again.writes.inserted, 0);
  assert_eq!(again.writes.deduplicated, 17);
  assert_eq!(p.store().count(Category::Weather).await.unwrap(), 6);
}

#[tokio::test]
async fn failed_area_does_not_stop_the_run() {
  let feed = ScriptedFeed::default()
    .failure("140000", FetchError::Http { status_code: 503 })
    .body("130000", FORECAST);
  let p = pipeline(feed).await;

  let summary = p.run(owned(&["140000", "130000"])).await.unwrap();

  assert_eq!(summary.succeeded, 1);
  assert_eq!(
    summary.failed,
    [("140000".to_owned(), FetchError::Http { status_code: 503 })]
  );
  assert_eq!(summary.areas(), 2);
  assert_eq!(p.store().count(Category::Weather).await.unwrap(), 6);
}

#[tokio::test]
async fn empty_document_is_a_failed_area() {
  let p = pipeline(ScriptedFeed::default().body("230000", "null")).await;

  let summary = p.run(owned(&["230000"])).await.unwrap();

  assert_eq!(summary.succeeded, 0);
  assert_eq!(summary.failed[0].1, FetchError::EmptyResponse);
}

#[tokio::test]
async fn document_without_series_succeeds_empty() {
  const BARE: &str = r#"[{"publishingOffice":"気象庁","reportDatetime":"2024-01-15T11:00:00+09:00"}]"#;
  let p = pipeline(ScriptedFeed::default().body("130000", BARE)).await;

  let summary = p.run(owned(&["130000"])).await.unwrap();

  assert_eq!(summary.succeeded, 1);
  assert_eq!(summary.writes.total(), 0);
}

#[tokio::test]
async fn concurrent_run_shares_one_office() {
  let feed = ScriptedFeed::default()
    .body("130000", FORECAST)
    .body("130001", FORECAST)
    .body("130002", FORECAST)
    .body("130003", FORECAST)
    .failure("130004", FetchError::Network("timed out".into()))
    .failure("130005", FetchError::EmptyResponse);
  let p = pipeline(feed).await.with_concurrency(3);

  let summary = p
    .run(owned(&["130005", "130000", "130001", "130004", "130002", "130003"]))
    .await
    .unwrap();

  assert_eq!(summary.succeeded, 4);
  let failed: Vec<&str> = summary.failed.iter().map(|(c, _)| c.as_str()).collect();
  assert_eq!(failed, ["130004", "130005"]);
  assert_eq!(summary.writes.inserted, 17);
  assert_eq!(summary.writes.deduplicated, 3 * 17);

  // Only one office row exists: the next new name gets the second id.
  let store = p.store();
  let jma = store.upsert_office("気象庁").await.unwrap();
  let other = store.upsert_office("銚子地方気象台").await.unwrap();
  assert_eq!(jma, 1);
  assert_eq!(other, 2);
}

#[tokio::test]
async fn lenient_normalization_stores_observation_points() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let feed = ScriptedFeed::default().body("130000", FORECAST);
  let p = Pipeline::new(
    store,
    feed,
    index(),
    NormalizeOptions { admit_unknown_areas: true },
  );

  let summary = p.run(owned(&["130000"])).await.unwrap();

  assert!(summary.unresolved_areas.is_empty());
  // The weekly report repeats the short-range day; those facts merge before
  // the store sees them, so its counters only reflect earlier runs.
  assert_eq!(summary.overlapping_facts, 2);
  assert_eq!(summary.writes, InsertSummary { inserted: 25, updated: 0, deduplicated: 0 });
  assert_eq!(p.store().count(Category::Temperature).await.unwrap(), 6);
  assert_eq!(p.store().count(Category::ClimateAverage).await.unwrap(), 2);
}

#[test]
fn summary_display_lists_failures() {
  let summary = RunSummary {
    succeeded: 2,
    failed: vec![("140000".into(), FetchError::Http { status_code: 503 })],
    writes: InsertSummary { inserted: 10, ..InsertSummary::default() },
    ..RunSummary::default()
  };

  let text = summary.to_string();
  assert!(text.contains("2 succeeded, 1 failed"));
  assert!(text.contains("10 inserted"));
  assert!(text.contains("140000: upstream returned HTTP 503"));
  assert!(!text.contains("merged"));

  let merged = RunSummary { overlapping_facts: 2, ..summary };
  assert!(merged.to_string().contains("merged: 2 facts repeated across reports"));
}

// ─── Source codes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn explicit_codes_win() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let codes = source_codes(&store, &index(), Some(owned(&["130000"]))).await.unwrap();
  assert_eq!(codes, ["130000"]);
}

#[tokio::test]
async fn codes_fall_back_to_index_then_store() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let index = index();

  let from_index = source_codes(&store, &index, None).await.unwrap();
  assert_eq!(from_index, ["130000", "140000", "230000"]);

  let partial = AreaIndex::from_json_str(r#"{"offices":{"130000":{"name":"東京都"}}}"#).unwrap();
  store.store_areas(&partial).await.unwrap();
  let from_store = source_codes(&store, &index, Some(vec![])).await.unwrap();
  assert_eq!(from_store, ["130000"]);
}
