//! [`SqliteStore`]: the SQLite implementation of [`ForecastStore`].

use std::{collections::HashSet, path::Path};

use jma_core::{
  area::{Area, AreaIndex, AreaLevel},
  forecast::{Category, FactRow},
  store::{ForecastStore, InsertSummary, OfficeId, StoredFact, TimeWindow},
};
use rusqlite::{OptionalExtension as _, ToSql, Transaction};

use crate::{
  Result,
  encode::{
    EncodedFact, HEAD_COLUMNS, RawFact, body_columns, encode_utc, table_for,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A forecast store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Write path ──────────────────────────────────────────────────────────────

enum WriteOutcome {
  Inserted,
  Updated,
  Deduplicated,
}

/// Write one fact, keeping only the newest report per natural key.
fn write_fact(
  tx: &Transaction<'_>,
  office: OfficeId,
  fact: &EncodedFact,
) -> rusqlite::Result<WriteOutcome> {
  let mut key_sql = String::from("publishing_office_id = ? AND area_code = ?");
  for (column, _) in &fact.key {
    key_sql.push_str(" AND ");
    key_sql.push_str(column);
    key_sql.push_str(" = ?");
  }

  let mut key_params: Vec<&dyn ToSql> = vec![&office, &fact.area_code];
  key_params.extend(fact.key.iter().map(|(_, v)| v as &dyn ToSql));

  let stored: Option<String> = tx
    .prepare_cached(&format!(
      "SELECT report_datetime FROM {} WHERE {key_sql}",
      fact.table
    ))?
    .query_row(key_params.as_slice(), |r| r.get(0))
    .optional()?;

  match stored {
    None => {
      let columns: Vec<&str> = ["publishing_office_id", "area_code"]
        .into_iter()
        .chain(fact.key.iter().map(|(c, _)| *c))
        .chain(["report_datetime"])
        .chain(fact.payload.iter().map(|(c, _)| *c))
        .collect();
      let placeholders = vec!["?"; columns.len()].join(", ");

      let mut params = key_params;
      params.push(&fact.report_datetime);
      params.extend(fact.payload.iter().map(|(_, v)| v as &dyn ToSql));

      tx.prepare_cached(&format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        fact.table,
        columns.join(", ")
      ))?
      .execute(params.as_slice())?;
      Ok(WriteOutcome::Inserted)
    }
    // Canonical UTC text compares in time order.
    Some(existing) if fact.report_datetime > existing => {
      let mut set_sql = String::from("report_datetime = ?");
      for (column, _) in &fact.payload {
        set_sql.push_str(", ");
        set_sql.push_str(column);
        set_sql.push_str(" = ?");
      }

      let mut params: Vec<&dyn ToSql> = vec![&fact.report_datetime];
      params.extend(fact.payload.iter().map(|(_, v)| v as &dyn ToSql));
      params.extend(key_params);

      tx.prepare_cached(&format!(
        "UPDATE {} SET {set_sql} WHERE {key_sql}",
        fact.table
      ))?
      .execute(params.as_slice())?;
      Ok(WriteOutcome::Updated)
    }
    Some(_) => Ok(WriteOutcome::Deduplicated),
  }
}

// ─── Read path ───────────────────────────────────────────────────────────────

/// The `WHERE` fragment windowing a category, and the column it orders by.
/// `?2` and `?3` bind the window's start and end.
///
/// Weekly days match when their local day overlaps the window; climate
/// averages have no target and are windowed on their report instant.
fn window_filter(category: Category) -> (&'static str, &'static str) {
  match category {
    Category::Weekly => (
      "(?2 IS NULL OR f.day_end > ?2) AND (?3 IS NULL OR f.day_start < ?3)",
      "f.day_start",
    ),
    Category::ClimateAverage => (
      "(?2 IS NULL OR f.report_datetime >= ?2) AND (?3 IS NULL OR f.report_datetime < ?3)",
      "f.report_datetime",
    ),
    Category::Weather | Category::Precipitation | Category::Temperature => (
      "(?2 IS NULL OR f.target_datetime >= ?2) AND (?3 IS NULL OR f.target_datetime < ?3)",
      "f.target_datetime",
    ),
  }
}

// ─── ForecastStore impl ──────────────────────────────────────────────────────

impl ForecastStore for SqliteStore {
  type Error = crate::Error;

  async fn ensure_schema(&self) -> Result<()> { self.init_schema().await }

  // ── Areas ─────────────────────────────────────────────────────────────────

  async fn store_areas(&self, index: &AreaIndex) -> Result<usize> {
    let areas: Vec<Area> = index.iter().cloned().collect();

    let added = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut added = 0;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO area
               (level, code, name, enName, parent, children, officeName, kana)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for area in &areas {
            let children =
              (!area.child_codes.is_empty()).then(|| area.child_codes.join(","));
            added += stmt.execute(rusqlite::params![
              area.level.as_str(),
              area.code,
              area.name,
              area.en_name,
              area.parent_code,
              children,
              area.office_name,
              area.kana,
            ])?;
          }
        }
        tx.commit()?;
        Ok(added)
      })
      .await?;

    tracing::debug!(added, total = index.len(), "stored area taxonomy");
    Ok(added)
  }

  async fn area_codes(&self, level: Option<AreaLevel>) -> Result<Vec<String>> {
    let level = level.map(AreaLevel::as_str);

    let codes = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT code FROM area WHERE (?1 IS NULL OR level = ?1) ORDER BY code",
        )?;
        let codes = stmt
          .query_map(rusqlite::params![level], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(codes)
      })
      .await?;

    Ok(codes)
  }

  // ── Offices ───────────────────────────────────────────────────────────────

  async fn upsert_office(&self, name: &str) -> Result<OfficeId> {
    let name = name.to_owned();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO publishing_offices (name) VALUES (?1)",
          rusqlite::params![name],
        )?;
        let id: OfficeId = conn.query_row(
          "SELECT id FROM publishing_offices WHERE name = ?1",
          rusqlite::params![name],
          |r| r.get(0),
        )?;
        Ok(id)
      })
      .await?;

    Ok(id)
  }

  // ── Facts ─────────────────────────────────────────────────────────────────

  async fn insert_facts(
    &self,
    office: OfficeId,
    rows: &[FactRow],
  ) -> Result<InsertSummary> {
    if rows.is_empty() {
      return Ok(InsertSummary::default());
    }

    let encoded: Vec<EncodedFact> = rows.iter().map(EncodedFact::new).collect();

    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut summary = InsertSummary::default();
        let mut seen_areas = HashSet::new();

        for fact in &encoded {
          if seen_areas.insert(fact.area_code.as_str()) {
            tx.prepare_cached(
              "INSERT OR IGNORE INTO areas (code, name, area_type) VALUES (?1, ?2, ?3)",
            )?
            .execute(rusqlite::params![fact.area_code, fact.area_name, fact.area_type])?;
          }

          match write_fact(&tx, office, fact)? {
            WriteOutcome::Inserted => summary.inserted += 1,
            WriteOutcome::Updated => summary.updated += 1,
            WriteOutcome::Deduplicated => summary.deduplicated += 1,
          }
        }

        tx.commit()?;
        Ok(summary)
      })
      .await?;

    if summary.deduplicated > 0 {
      tracing::debug!(
        office,
        deduplicated = summary.deduplicated,
        "skipped facts already stored from an equal or newer report"
      );
    }
    Ok(summary)
  }

  async fn query_range(
    &self,
    area_code: &str,
    categories: &[Category],
    window: &TimeWindow,
  ) -> Result<Vec<StoredFact>> {
    let mut categories = if categories.is_empty() {
      Category::ALL.to_vec()
    } else {
      categories.to_vec()
    };
    categories.sort();
    categories.dedup();

    let area_code = area_code.to_owned();
    let start = window.start.map(encode_utc);
    let end = window.end.map(encode_utc);

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let mut raws = Vec::new();
        for category in categories {
          let (filter, column) = window_filter(category);
          let mut stmt = conn.prepare_cached(&format!(
            "SELECT {HEAD_COLUMNS}, {}
             FROM {} f
             JOIN publishing_offices o ON o.id = f.publishing_office_id
             LEFT JOIN areas a ON a.code = f.area_code
             WHERE f.area_code = ?1 AND {filter}
             ORDER BY {column}, f.id",
            body_columns(category),
            table_for(category),
          ))?;
          let rows = stmt.query_map(rusqlite::params![area_code, &start, &end], |row| {
            RawFact::read(category, row)
          })?;
          for raw in rows {
            raws.push(raw?);
          }
        }
        Ok(raws)
      })
      .await?;

    let mut facts = raws
      .into_iter()
      .map(RawFact::into_stored)
      .collect::<Result<Vec<_>>>()?;
    facts.sort_by_key(|f| (f.fact.sort_key(), f.fact.category()));
    Ok(facts)
  }

  async fn count(&self, category: Category) -> Result<usize> {
    let table = table_for(category);

    let n = self
      .conn
      .call(move |conn| {
        let n: usize = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| {
          r.get(0)
        })?;
        Ok(n)
      })
      .await?;

    Ok(n)
  }
}
