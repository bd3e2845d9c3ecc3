//! Encoding and decoding helpers between the domain fact types and the plain
//! column values stored in SQLite.
//!
//! Instants are stored as UTC RFC 3339 at second precision (`...Z`), so that
//! comparing two stored strings compares the instants. Local days are stored
//! as `YYYY-MM-DD`, next to the instants bounding them. Enumerations are
//! stored as their lowercase names.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeDelta, Utc};
use jma_core::{
  area::AreaLevel,
  forecast::{
    AreaRef, Category, ClimateAverageFact, FactRow, PrecipitationFact,
    TemperatureFact, WeatherFact, WeeklyFact,
  },
  store::StoredFact,
};
use rusqlite::{Row, types::Value};

use crate::{Error, Result};

// ─── Instants and days ───────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<FixedOffset>) -> String { encode_utc(dt.to_utc()) }

pub fn encode_utc(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(s).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Tables ──────────────────────────────────────────────────────────────────

pub fn table_for(category: Category) -> &'static str {
  match category {
    Category::Weather => "weather_forecasts",
    Category::Precipitation => "precipitation_probability_forecasts",
    Category::Temperature => "temperature_forecasts",
    Category::Weekly => "weekly_forecasts",
    Category::ClimateAverage => "climate_averages",
  }
}

// ─── Write side ──────────────────────────────────────────────────────────────

fn text(s: &Option<String>) -> Value { s.clone().map_or(Value::Null, Value::Text) }

fn real(v: Option<f64>) -> Value { v.map_or(Value::Null, Value::Real) }

fn int(v: Option<u8>) -> Value { v.map_or(Value::Null, |v| Value::Integer(v.into())) }

/// A fact flattened into column/value pairs, ready to bind.
///
/// `key` holds the natural-key columns beyond office and area; `payload` the
/// columns a newer report may overwrite.
#[derive(Debug, Clone)]
pub struct EncodedFact {
  pub table:           &'static str,
  pub area_code:       String,
  pub area_name:       Option<String>,
  pub area_type:       Option<&'static str>,
  pub report_datetime: String,
  pub key:             Vec<(&'static str, Value)>,
  pub payload:         Vec<(&'static str, Value)>,
}

impl EncodedFact {
  pub fn new(row: &FactRow) -> Self {
    let (key, payload) = match row {
      FactRow::Weather(f) => (
        vec![("target_datetime", Value::Text(encode_dt(f.target_datetime)))],
        vec![
          ("weather_code", text(&f.weather_code)),
          ("weather_text", text(&f.weather_text)),
          ("wind_text", text(&f.wind_text)),
          ("wave_text", text(&f.wave_text)),
        ],
      ),
      FactRow::Precipitation(f) => (
        vec![("target_datetime", Value::Text(encode_dt(f.target_datetime)))],
        vec![("probability", int(f.probability))],
      ),
      FactRow::Temperature(f) => (
        vec![
          ("target_datetime", Value::Text(encode_dt(f.target_datetime))),
          ("temp_type", Value::Text(f.temp_type.as_str().to_owned())),
        ],
        vec![
          ("temperature", real(f.temperature)),
          ("temperature_upper", real(f.temperature_upper)),
          ("temperature_lower", real(f.temperature_lower)),
        ],
      ),
      FactRow::Weekly(f) => (
        vec![("target_date", Value::Text(encode_date(f.target_date)))],
        vec![
          ("day_start", Value::Text(encode_dt(f.day_start))),
          ("day_end", Value::Text(encode_dt(f.day_start + TimeDelta::days(1)))),
          ("weather_code", text(&f.weather_code)),
          ("precipitation_probability", int(f.precipitation_probability)),
          ("reliability", text(&f.reliability)),
        ],
      ),
      FactRow::ClimateAverage(f) => (
        vec![("type", Value::Text(f.kind.as_str().to_owned()))],
        vec![("min_value", real(f.min_value)), ("max_value", real(f.max_value))],
      ),
    };

    let area = row.area();
    Self {
      table: table_for(row.category()),
      area_code: area.code.clone(),
      area_name: area.name.clone(),
      area_type: area.level.map(AreaLevel::as_str),
      report_datetime: encode_dt(row.report_datetime()),
      key,
      payload,
    }
  }
}

// ─── Read side ───────────────────────────────────────────────────────────────

/// Columns every fact query selects first, in this order.
pub const HEAD_COLUMNS: &str = "o.name, f.report_datetime, f.area_code, a.name, a.area_type";

/// Category-specific columns, selected after [`HEAD_COLUMNS`].
pub fn body_columns(category: Category) -> &'static str {
  match category {
    Category::Weather => {
      "f.target_datetime, f.weather_code, f.weather_text, f.wind_text, f.wave_text"
    }
    Category::Precipitation => "f.target_datetime, f.probability",
    Category::Temperature => {
      "f.target_datetime, f.temp_type, f.temperature, f.temperature_upper, \
       f.temperature_lower"
    }
    Category::Weekly => {
      "f.target_date, f.day_start, f.weather_code, f.precipitation_probability, \
       f.reliability"
    }
    Category::ClimateAverage => "f.type, f.min_value, f.max_value",
  }
}

/// Shared columns of a fact row joined with its office and area.
pub struct RawHead {
  pub office:          String,
  pub report_datetime: String,
  pub area_code:       String,
  pub area_name:       Option<String>,
  pub area_type:       Option<String>,
}

impl RawHead {
  fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      office:          row.get(0)?,
      report_datetime: row.get(1)?,
      area_code:       row.get(2)?,
      area_name:       row.get(3)?,
      area_type:       row.get(4)?,
    })
  }

  fn area(&self) -> Result<AreaRef> {
    let level = self
      .area_type
      .as_deref()
      .map(str::parse::<AreaLevel>)
      .transpose()?;
    Ok(AreaRef {
      code: self.area_code.clone(),
      name: self.area_name.clone(),
      level,
    })
  }
}

/// Raw column values read directly from one fact table.
pub enum RawFact {
  Weather {
    head:   RawHead,
    target: String,
    code:   Option<String>,
    text:   Option<String>,
    wind:   Option<String>,
    wave:   Option<String>,
  },
  Precipitation {
    head:        RawHead,
    target:      String,
    probability: Option<i64>,
  },
  Temperature {
    head:        RawHead,
    target:      String,
    temp_type:   String,
    temperature: Option<f64>,
    upper:       Option<f64>,
    lower:       Option<f64>,
  },
  Weekly {
    head:        RawHead,
    target_date: String,
    day_start:   String,
    code:        Option<String>,
    probability: Option<i64>,
    reliability: Option<String>,
  },
  ClimateAverage {
    head: RawHead,
    kind: String,
    min:  Option<f64>,
    max:  Option<f64>,
  },
}

impl RawFact {
  /// Read a row selected with [`HEAD_COLUMNS`] then [`body_columns`].
  pub fn read(category: Category, row: &Row<'_>) -> rusqlite::Result<Self> {
    let head = RawHead::read(row)?;
    Ok(match category {
      Category::Weather => Self::Weather {
        head,
        target: row.get(5)?,
        code: row.get(6)?,
        text: row.get(7)?,
        wind: row.get(8)?,
        wave: row.get(9)?,
      },
      Category::Precipitation => Self::Precipitation {
        head,
        target: row.get(5)?,
        probability: row.get(6)?,
      },
      Category::Temperature => Self::Temperature {
        head,
        target: row.get(5)?,
        temp_type: row.get(6)?,
        temperature: row.get(7)?,
        upper: row.get(8)?,
        lower: row.get(9)?,
      },
      Category::Weekly => Self::Weekly {
        head,
        target_date: row.get(5)?,
        day_start: row.get(6)?,
        code: row.get(7)?,
        probability: row.get(8)?,
        reliability: row.get(9)?,
      },
      Category::ClimateAverage => Self::ClimateAverage {
        head,
        kind: row.get(5)?,
        min: row.get(6)?,
        max: row.get(7)?,
      },
    })
  }

  pub fn into_stored(self) -> Result<StoredFact> {
    let (head, fact) = match self {
      Self::Weather { head, target, code, text, wind, wave } => {
        let fact = FactRow::Weather(WeatherFact {
          report_datetime: decode_dt(&head.report_datetime)?,
          area:            head.area()?,
          target_datetime: decode_dt(&target)?,
          weather_code:    code,
          weather_text:    text,
          wind_text:       wind,
          wave_text:       wave,
        });
        (head, fact)
      }
      Self::Precipitation { head, target, probability } => {
        let fact = FactRow::Precipitation(PrecipitationFact {
          report_datetime: decode_dt(&head.report_datetime)?,
          area:            head.area()?,
          target_datetime: decode_dt(&target)?,
          probability:     decode_percent("probability", probability)?,
        });
        (head, fact)
      }
      Self::Temperature { head, target, temp_type, temperature, upper, lower } => {
        let fact = FactRow::Temperature(TemperatureFact {
          report_datetime:   decode_dt(&head.report_datetime)?,
          area:              head.area()?,
          target_datetime:   decode_dt(&target)?,
          temp_type:         temp_type.parse()?,
          temperature,
          temperature_upper: upper,
          temperature_lower: lower,
        });
        (head, fact)
      }
      Self::Weekly { head, target_date, day_start, code, probability, reliability } => {
        let fact = FactRow::Weekly(WeeklyFact {
          report_datetime:           decode_dt(&head.report_datetime)?,
          area:                      head.area()?,
          target_date:               decode_date(&target_date)?,
          day_start:                 decode_dt(&day_start)?,
          weather_code:              code,
          precipitation_probability: decode_percent(
            "precipitation_probability",
            probability,
          )?,
          reliability,
        });
        (head, fact)
      }
      Self::ClimateAverage { head, kind, min, max } => {
        let fact = FactRow::ClimateAverage(ClimateAverageFact {
          report_datetime: decode_dt(&head.report_datetime)?,
          area:            head.area()?,
          kind:            kind.parse()?,
          min_value:       min,
          max_value:       max,
        });
        (head, fact)
      }
    };
    Ok(StoredFact { publishing_office: head.office, fact })
  }
}

fn decode_percent(column: &'static str, value: Option<i64>) -> Result<Option<u8>> {
  value
    .map(|v| {
      u8::try_from(v)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(Error::Decode { column, value: v.to_string() })
    })
    .transpose()
}
