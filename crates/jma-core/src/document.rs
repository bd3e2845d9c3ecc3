//! The upstream forecast document, as fetched.
//!
//! A document is a JSON array of at most two reports. Reports are kept as raw
//! JSON until the normalizer asks for them, so that one malformed report does
//! not poison its sibling.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── Document ────────────────────────────────────────────────────────────────

/// One fetched document: the ordered reports published for an area code.
#[derive(Debug, Clone)]
pub struct ForecastDocument {
  reports: Vec<Value>,
}

impl ForecastDocument {
  /// Wrap a parsed JSON body.
  ///
  /// `null` and `[]` are [`Error::EmptyDocument`]; anything other than an
  /// array is [`Error::MalformedDocument`].
  pub fn from_value(value: Value) -> Result<Self> {
    match value {
      Value::Null => Err(Error::EmptyDocument),
      Value::Array(reports) if reports.is_empty() => Err(Error::EmptyDocument),
      Value::Array(reports) => Ok(Self { reports }),
      other => Err(Error::MalformedDocument(format!(
        "expected an array of reports, got {}",
        json_kind(&other)
      ))),
    }
  }

  pub fn from_json_str(s: &str) -> Result<Self> {
    if s.trim().is_empty() {
      return Err(Error::EmptyDocument);
    }
    Self::from_value(serde_json::from_str(s)?)
  }

  pub fn len(&self) -> usize { self.reports.len() }

  pub fn is_empty(&self) -> bool { self.reports.is_empty() }

  /// Decode the report at `index`. `None` if there is no such report.
  pub fn report(&self, index: usize) -> Option<Result<Report>> {
    self
      .reports
      .get(index)
      .map(|raw| Ok(Report::deserialize(raw)?))
  }
}

/// Parse an upstream instant such as `2024-01-15T11:00:00+09:00`.
pub fn parse_instant(raw: &str) -> Result<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(raw).map_err(|_| Error::InvalidDatetime(raw.to_owned()))
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// One report: a publishing office, a publication instant and its series.
///
/// Every key is optional here; the normalizer decides what a missing key
/// means.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
  pub publishing_office: Option<String>,
  pub report_datetime:   Option<String>,
  pub time_series:       Option<Vec<TimeSeries>>,
  pub temp_average:      Option<AverageBlock>,
  pub precip_average:    Option<AverageBlock>,
}

/// One forecast category's block: shared target times plus, per area,
/// parallel arrays aligned to those times.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
  #[serde(default)]
  pub time_defines: Vec<String>,
  #[serde(default)]
  pub areas:        Vec<AreaEntry>,
}

impl TimeSeries {
  /// The area whose keys decide the series' shape.
  pub fn probe(&self) -> Option<&AreaEntry> { self.areas.first() }
}

/// The `area` reference used inside documents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocArea {
  pub code: String,
  pub name: Option<String>,
}

/// One area's slice of a series. Every key besides `area` is a column.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaEntry {
  pub area:    DocArea,
  #[serde(flatten)]
  pub columns: Map<String, Value>,
}

impl AreaEntry {
  pub fn has_column(&self, key: &str) -> bool { self.columns.contains_key(key) }

  /// The `index`-th value of column `key`, if both exist.
  pub fn cell(&self, key: &str, index: usize) -> Option<&Value> {
    self.columns.get(key)?.as_array()?.get(index)
  }
}

/// `tempAverage` / `precipAverage`: one climatological range per area.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AverageBlock {
  #[serde(default)]
  pub areas: Vec<AverageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AverageEntry {
  pub area: DocArea,
  pub min:  Option<Value>,
  pub max:  Option<Value>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn null_and_empty_are_empty_documents() {
    assert!(matches!(ForecastDocument::from_json_str("null"), Err(Error::EmptyDocument)));
    assert!(matches!(ForecastDocument::from_json_str("[]"), Err(Error::EmptyDocument)));
    assert!(matches!(ForecastDocument::from_json_str("  "), Err(Error::EmptyDocument)));
  }

  #[test]
  fn object_body_is_malformed() {
    let err = ForecastDocument::from_json_str(r#"{"reportDatetime":"x"}"#).unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(ref m) if m.contains("an object")));
  }

  #[test]
  fn instants_keep_their_offset() {
    let dt = parse_instant("2024-01-15T11:00:00+09:00").unwrap();
    assert_eq!(dt.offset().local_minus_utc(), 9 * 3600);
    assert!(matches!(parse_instant("2024-01-15 11:00"), Err(Error::InvalidDatetime(_))));
  }

  #[test]
  fn report_keys_are_optional() {
    let doc = ForecastDocument::from_json_str(r#"[{"publishingOffice":"気象庁"}]"#).unwrap();
    let report = doc.report(0).unwrap().unwrap();
    assert_eq!(report.publishing_office.as_deref(), Some("気象庁"));
    assert!(report.time_series.is_none());
    assert!(doc.report(1).is_none());
  }

  #[test]
  fn ragged_cells_read_as_absent() {
    let entry: AreaEntry = serde_json::from_str(
      r#"{"area":{"code":"130010","name":"東京地方"},"weathers":["晴れ"],"winds":"n/a"}"#,
    )
    .unwrap();
    assert!(entry.has_column("weathers"));
    assert_eq!(entry.cell("weathers", 0), Some(&Value::from("晴れ")));
    assert_eq!(entry.cell("weathers", 1), None);
    assert_eq!(entry.cell("winds", 0), None);
    assert_eq!(entry.cell("waves", 0), None);
  }
}
