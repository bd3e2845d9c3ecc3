//! Fact rows, the normalized unit written to the forecast store.
//!
//! Every row carries the publication instant of its report
//! (`report_datetime`) separately from the instant or day it describes
//! (`target_datetime` / `target_date`). The two come from distinct source
//! fields and are never derived from one another.

use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, area::AreaLevel};

// ─── Category ────────────────────────────────────────────────────────────────

/// The five fact tables.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  Weather,
  Precipitation,
  Temperature,
  Weekly,
  ClimateAverage,
}

impl Category {
  pub const ALL: [Category; 5] = [
    Category::Weather,
    Category::Precipitation,
    Category::Temperature,
    Category::Weekly,
    Category::ClimateAverage,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Weather => "weather",
      Self::Precipitation => "precipitation",
      Self::Temperature => "temperature",
      Self::Weekly => "weekly",
      Self::ClimateAverage => "climate_average",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Category::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| Error::UnknownCategory(s.to_string()))
  }
}

// ─── Shared parts ────────────────────────────────────────────────────────────

/// The area a fact describes, as named by the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRef {
  pub code:  String,
  pub name:  Option<String>,
  /// `None` when the code is not part of the taxonomy (observation points).
  pub level: Option<AreaLevel>,
}

/// Whether a temperature is the period's minimum or maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempType {
  Low,
  High,
}

impl TempType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::High => "high",
    }
  }
}

impl FromStr for TempType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "low" => Ok(Self::Low),
      "high" => Ok(Self::High),
      other => Err(Error::UnknownCategory(format!("temp type {other}"))),
    }
  }
}

/// What a climatological range measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateKind {
  Temperature,
  Precipitation,
}

impl ClimateKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Temperature => "temperature",
      Self::Precipitation => "precipitation",
    }
  }
}

impl FromStr for ClimateKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "temperature" => Ok(Self::Temperature),
      "precipitation" => Ok(Self::Precipitation),
      other => Err(Error::UnknownCategory(format!("climate type {other}"))),
    }
  }
}

// ─── Per-category payloads ───────────────────────────────────────────────────

/// Categorical weather for one area at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherFact {
  pub report_datetime: DateTime<FixedOffset>,
  pub area:            AreaRef,
  pub target_datetime: DateTime<FixedOffset>,
  pub weather_code:    Option<String>,
  pub weather_text:    Option<String>,
  pub wind_text:       Option<String>,
  pub wave_text:       Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationFact {
  pub report_datetime: DateTime<FixedOffset>,
  pub area:            AreaRef,
  pub target_datetime: DateTime<FixedOffset>,
  /// Percent; `None` when the source cell is empty.
  pub probability:     Option<u8>,
}

/// A point or ranged temperature reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureFact {
  pub report_datetime:   DateTime<FixedOffset>,
  pub area:              AreaRef,
  pub target_datetime:   DateTime<FixedOffset>,
  pub temp_type:         TempType,
  pub temperature:       Option<f64>,
  pub temperature_upper: Option<f64>,
  pub temperature_lower: Option<f64>,
}

/// One day of the weekly outlook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyFact {
  pub report_datetime:           DateTime<FixedOffset>,
  pub area:                      AreaRef,
  /// The local calendar day described.
  pub target_date:               NaiveDate,
  /// Local midnight opening `target_date`; the day spans 24 hours from here.
  pub day_start:                 DateTime<FixedOffset>,
  pub weather_code:              Option<String>,
  pub precipitation_probability: Option<u8>,
  /// Qualitative reliability grade (`A`/`B`/`C`).
  pub reliability:               Option<String>,
}

/// A climatological reference range tied to a report, not an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateAverageFact {
  pub report_datetime: DateTime<FixedOffset>,
  pub area:            AreaRef,
  pub kind:            ClimateKind,
  pub min_value:       Option<f64>,
  pub max_value:       Option<f64>,
}

// ─── FactRow ─────────────────────────────────────────────────────────────────

/// A normalized fact, tagged by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum FactRow {
  Weather(WeatherFact),
  Precipitation(PrecipitationFact),
  Temperature(TemperatureFact),
  Weekly(WeeklyFact),
  ClimateAverage(ClimateAverageFact),
}

impl FactRow {
  pub fn category(&self) -> Category {
    match self {
      Self::Weather(_) => Category::Weather,
      Self::Precipitation(_) => Category::Precipitation,
      Self::Temperature(_) => Category::Temperature,
      Self::Weekly(_) => Category::Weekly,
      Self::ClimateAverage(_) => Category::ClimateAverage,
    }
  }

  pub fn area(&self) -> &AreaRef {
    match self {
      Self::Weather(f) => &f.area,
      Self::Precipitation(f) => &f.area,
      Self::Temperature(f) => &f.area,
      Self::Weekly(f) => &f.area,
      Self::ClimateAverage(f) => &f.area,
    }
  }

  pub fn report_datetime(&self) -> DateTime<FixedOffset> {
    match self {
      Self::Weather(f) => f.report_datetime,
      Self::Precipitation(f) => f.report_datetime,
      Self::Temperature(f) => f.report_datetime,
      Self::Weekly(f) => f.report_datetime,
      Self::ClimateAverage(f) => f.report_datetime,
    }
  }

  /// The instant used to order facts of mixed categories.
  ///
  /// Weekly days sort at their local midnight; climate averages, which
  /// describe no instant, sort at their report's publication time.
  pub fn sort_key(&self) -> DateTime<Utc> {
    match self {
      Self::Weather(f) => f.target_datetime.to_utc(),
      Self::Precipitation(f) => f.target_datetime.to_utc(),
      Self::Temperature(f) => f.target_datetime.to_utc(),
      Self::Weekly(f) => f.day_start.to_utc(),
      Self::ClimateAverage(f) => f.report_datetime.to_utc(),
    }
  }

  /// The row's identity within one publishing office.
  pub fn natural_key(&self) -> FactKey {
    let target = match self {
      Self::Weather(f) => KeyTarget::Instant(f.target_datetime.to_utc()),
      Self::Precipitation(f) => KeyTarget::Instant(f.target_datetime.to_utc()),
      Self::Temperature(f) => {
        KeyTarget::Temperature(f.target_datetime.to_utc(), f.temp_type)
      }
      Self::Weekly(f) => KeyTarget::Day(f.target_date),
      Self::ClimateAverage(f) => KeyTarget::Climate(f.kind),
    };
    FactKey {
      category: self.category(),
      area_code: self.area().code.clone(),
      target,
    }
  }
}

/// Category, area and target: what a store deduplicates on per office.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
  pub category:  Category,
  pub area_code: String,
  pub target:    KeyTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTarget {
  Instant(DateTime<Utc>),
  Temperature(DateTime<Utc>, TempType),
  Day(NaiveDate),
  Climate(ClimateKind),
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(s: &str) -> DateTime<FixedOffset> { DateTime::parse_from_rfc3339(s).unwrap() }

  fn tokyo() -> AreaRef {
    AreaRef {
      code:  "130010".into(),
      name:  Some("東京地方".into()),
      level: Some(AreaLevel::Subdivision10),
    }
  }

  #[test]
  fn category_round_trips_through_str() {
    for c in Category::ALL {
      assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
    }
    assert!("pollen".parse::<Category>().is_err());
  }

  #[test]
  fn sort_key_uses_target_not_report() {
    let row = FactRow::Precipitation(PrecipitationFact {
      report_datetime: at("2024-01-15T11:00:00+09:00"),
      area:            tokyo(),
      target_datetime: at("2024-01-16T06:00:00+09:00"),
      probability:     Some(20),
    });
    assert_eq!(row.sort_key(), at("2024-01-15T21:00:00Z").to_utc());
    assert_ne!(row.sort_key(), row.report_datetime().to_utc());
  }

  #[test]
  fn weekly_days_sort_at_local_midnight() {
    let row = FactRow::Weekly(WeeklyFact {
      report_datetime:           at("2024-01-15T11:00:00+09:00"),
      area:                      tokyo(),
      target_date:               NaiveDate::from_ymd_opt(2024, 1, 17).unwrap(),
      day_start:                 at("2024-01-17T00:00:00+09:00"),
      weather_code:              None,
      precipitation_probability: None,
      reliability:               None,
    });
    assert_eq!(row.sort_key(), at("2024-01-16T15:00:00Z").to_utc());
  }

  #[test]
  fn temperature_keys_include_type() {
    let temp = |temp_type| {
      FactRow::Temperature(TemperatureFact {
        report_datetime: at("2024-01-15T11:00:00+09:00"),
        area: tokyo(),
        target_datetime: at("2024-01-16T00:00:00+09:00"),
        temp_type,
        temperature: None,
        temperature_upper: None,
        temperature_lower: None,
      })
    };
    assert_ne!(temp(TempType::Low).natural_key(), temp(TempType::High).natural_key());

    let mut later_report = temp(TempType::Low);
    if let FactRow::Temperature(t) = &mut later_report {
      t.report_datetime = at("2024-01-15T17:00:00+09:00");
      t.target_datetime = at("2024-01-15T15:00:00Z");
    }
    assert_eq!(later_report.natural_key(), temp(TempType::Low).natural_key());
  }

  #[test]
  fn serialized_rows_are_tagged_by_category() {
    let row = FactRow::Weekly(WeeklyFact {
      report_datetime:           at("2024-01-15T11:00:00+09:00"),
      area:                      tokyo(),
      target_date:               NaiveDate::from_ymd_opt(2024, 1, 17).unwrap(),
      day_start:                 at("2024-01-17T00:00:00+09:00"),
      weather_code:              Some("200".into()),
      precipitation_probability: Some(40),
      reliability:               None,
    });
    let json = serde_json::to_value(&row).unwrap();
    assert_eq!(json["category"], "weekly");
    assert_eq!(json["data"]["target_date"], "2024-01-17");
    assert!(json["data"]["reliability"].is_null());
  }
}
