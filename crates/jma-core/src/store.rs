//! The `ForecastStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `jma-store-sqlite`).
//! The ingestion pipeline depends on this abstraction, not on any concrete
//! backend.

use std::{future::Future, ops::AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  area::{AreaIndex, AreaLevel},
  forecast::{Category, FactRow},
};

/// Surrogate id of a row in `publishing_offices`.
pub type OfficeId = i64;

// ─── Write outcome ───────────────────────────────────────────────────────────

/// How a batch of facts landed in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertSummary {
  /// Rows whose natural key was not yet present.
  pub inserted:     usize,
  /// Rows that replaced an existing key from an older report.
  pub updated:      usize,
  /// Rows skipped because the key already holds an equal or newer report.
  pub deduplicated: usize,
}

impl InsertSummary {
  pub fn total(&self) -> usize { self.inserted + self.updated + self.deduplicated }
}

impl AddAssign for InsertSummary {
  fn add_assign(&mut self, rhs: Self) {
    self.inserted += rhs.inserted;
    self.updated += rhs.updated;
    self.deduplicated += rhs.deduplicated;
  }
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// A half-open `[start, end)` window; an absent bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

impl TimeWindow {
  pub fn all() -> Self { Self::default() }

  pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self { start: Some(start), end: Some(end) }
  }

  pub fn contains(&self, instant: DateTime<Utc>) -> bool {
    self.start.is_none_or(|s| instant >= s) && self.end.is_none_or(|e| instant < e)
  }

  /// Whether the half-open extent `[from, until)` shares any instant with
  /// the window.
  pub fn overlaps(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    self.start.is_none_or(|s| until > s) && self.end.is_none_or(|e| from < e)
  }
}

/// A fact read back from the store, with its publishing office resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFact {
  pub publishing_office: String,
  pub fact:              FactRow,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a forecast store backend.
///
/// Fact writes are idempotent on the natural key
/// `(office, area, target time | type)`: repeating a batch never adds rows.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait ForecastStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create tables and indexes if missing. Safe to call on every run.
  fn ensure_schema(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Areas ─────────────────────────────────────────────────────────────

  /// Persist the taxonomy into the `area` table, skipping codes already
  /// present. Returns the number of new rows.
  fn store_areas<'a>(
    &'a self,
    index: &'a AreaIndex,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// The stored area codes, optionally restricted to one level, ordered by
  /// code.
  fn area_codes(
    &self,
    level: Option<AreaLevel>,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  // ── Offices ───────────────────────────────────────────────────────────

  /// Return the id for `name`, creating the office on first sighting.
  fn upsert_office<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<OfficeId, Self::Error>> + Send + 'a;

  // ── Facts ─────────────────────────────────────────────────────────────

  /// Write `rows` under `office`. Natural-key collisions are not errors:
  /// a newer report replaces the stored payload, anything else is skipped.
  fn insert_facts<'a>(
    &'a self,
    office: OfficeId,
    rows: &'a [FactRow],
  ) -> impl Future<Output = Result<InsertSummary, Self::Error>> + Send + 'a;

  /// Facts for `area_code` in the requested categories whose target falls in
  /// `window`, ordered by target ascending. Weekly days match when any part
  /// of their local day overlaps the window.
  ///
  /// An empty `categories` slice means all categories.
  fn query_range<'a>(
    &'a self,
    area_code: &'a str,
    categories: &'a [Category],
    window: &'a TimeWindow,
  ) -> impl Future<Output = Result<Vec<StoredFact>, Self::Error>> + Send + 'a;

  /// Number of rows in a category's table.
  fn count(
    &self,
    category: Category,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  fn utc(s: &str) -> DateTime<Utc> { s.parse().unwrap() }

  #[test]
  fn window_is_half_open() {
    let w = TimeWindow::between(utc("2024-01-15T00:00:00Z"), utc("2024-01-16T00:00:00Z"));
    assert!(w.contains(utc("2024-01-15T00:00:00Z")));
    assert!(w.contains(utc("2024-01-15T23:59:59Z")));
    assert!(!w.contains(utc("2024-01-16T00:00:00Z")));
    assert!(TimeWindow::all().contains(utc("1999-01-01T00:00:00Z")));
  }

  #[test]
  fn extents_overlap_by_any_instant() {
    let w = TimeWindow::between(utc("2024-01-16T15:30:00Z"), utc("2024-01-16T16:00:00Z"));
    // A JST day runs 15:00Z to 15:00Z.
    let jst_16th = (utc("2024-01-15T15:00:00Z"), utc("2024-01-16T15:00:00Z"));
    let jst_17th = (utc("2024-01-16T15:00:00Z"), utc("2024-01-17T15:00:00Z"));
    assert!(!w.overlaps(jst_16th.0, jst_16th.1));
    assert!(w.overlaps(jst_17th.0, jst_17th.1));

    let touching = TimeWindow::between(utc("2024-01-16T15:00:00Z"), utc("2024-01-17T00:00:00Z"));
    assert!(!touching.overlaps(jst_16th.0, jst_16th.1));
    assert!(TimeWindow::all().overlaps(jst_16th.0, jst_16th.1));
  }

  #[test]
  fn summaries_accumulate() {
    let mut total = InsertSummary::default();
    total += InsertSummary { inserted: 3, updated: 1, deduplicated: 0 };
    total += InsertSummary { inserted: 0, updated: 0, deduplicated: 4 };
    assert_eq!(total, InsertSummary { inserted: 3, updated: 1, deduplicated: 4 });
    assert_eq!(total.total(), 8);
  }
}
