//! Forecast normalizer: upstream document → fact rows.
//!
//! Pipeline:
//!   ForecastDocument
//!     └─ report(0) short-range, report(1) weekly/climate
//!          └─ classify()       → SeriesShape per time-series block
//!               └─ align()     → TimeSlot per (area, timeDefines[i])
//!                    └─ emit   → FactRow per slot
//!
//! Series are classified by probing the keys of their first area against a
//! priority-ordered table. A block that matches no entry is dropped, so new
//! upstream series degrade to "ignored" rather than to an error.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Timelike};
use serde_json::Value;

use crate::{
  area::AreaIndex,
  document::{
    AreaEntry, AverageBlock, DocArea, ForecastDocument, Report, TimeSeries, parse_instant,
  },
  forecast::{
    AreaRef, ClimateAverageFact, ClimateKind, FactRow, PrecipitationFact, TempType,
    TemperatureFact, WeatherFact, WeeklyFact,
  },
};

// ─── Classification ──────────────────────────────────────────────────────────

/// Which of the two reports a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
  ShortRange,
  Weekly,
}

impl ReportKind {
  fn from_index(index: usize) -> Option<Self> {
    match index {
      0 => Some(Self::ShortRange),
      1 => Some(Self::Weekly),
      _ => None,
    }
  }

  fn shapes(self) -> &'static [(SeriesShape, &'static [&'static str])] {
    match self {
      Self::ShortRange => SHORT_RANGE_SHAPES,
      Self::Weekly => WEEKLY_SHAPES,
    }
  }
}

/// The known layouts of a time-series block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesShape {
  Weather,
  Precipitation,
  Temperature,
  Weekly,
  WeeklyTemperature,
}

/// Earlier entries win when a block carries keys of several shapes.
const SHORT_RANGE_SHAPES: &[(SeriesShape, &[&str])] = &[
  (SeriesShape::Weather, &["weatherCodes", "weathers"]),
  (SeriesShape::Precipitation, &["pops"]),
  (SeriesShape::Temperature, &["temps"]),
];

const WEEKLY_SHAPES: &[(SeriesShape, &[&str])] = &[
  (SeriesShape::Weekly, &["weatherCodes", "pops", "reliabilities"]),
  (SeriesShape::WeeklyTemperature, &["tempsMin", "tempsMax"]),
];

/// Classify `series` by the keys of its first area. `None` means the block
/// has no areas or an unrecognised layout.
pub fn classify(series: &TimeSeries, kind: ReportKind) -> Option<SeriesShape> {
  let probe = series.probe()?;
  kind
    .shapes()
    .iter()
    .find(|(_, keys)| keys.iter().any(|k| probe.has_column(k)))
    .map(|(shape, _)| *shape)
}

// ─── Positional join ─────────────────────────────────────────────────────────

/// The `index`-th defined time of a series, paired with one area's columns.
pub struct TimeSlot<'a> {
  pub index:  usize,
  pub target: DateTime<FixedOffset>,
  entry:      &'a AreaEntry,
}

impl TimeSlot<'_> {
  /// Text at this slot. Empty strings and missing or short columns are
  /// `None`.
  pub fn text(&self, key: &str) -> Option<String> {
    cell_text(self.entry.cell(key, self.index)?)
  }

  /// Integer percent at this slot; unparsable or out of range is `None`.
  pub fn percent(&self, key: &str) -> Option<u8> {
    cell_percent(self.entry.cell(key, self.index)?)
  }

  pub fn real(&self, key: &str) -> Option<f64> {
    cell_real(self.entry.cell(key, self.index)?)
  }
}

/// Pair every entry of `time_defines` with `entry` by position.
///
/// Columns shorter than `time_defines` read as `None` past their end. Times
/// that do not parse as RFC 3339 are skipped.
pub fn align<'a>(
  time_defines: &'a [String],
  entry: &'a AreaEntry,
) -> impl Iterator<Item = TimeSlot<'a>> + 'a {
  time_defines
    .iter()
    .enumerate()
    .filter_map(move |(index, raw)| match parse_instant(raw) {
      Ok(target) => Some(TimeSlot { index, target, entry }),
      Err(e) => {
        tracing::debug!(time = %raw, error = %e, "skipping unparsable timeDefine");
        None
      }
    })
}

fn cell_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if s.trim().is_empty() => None,
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn cell_real(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn cell_percent(value: &Value) -> Option<u8> {
  let n = match value {
    Value::Number(n) => n.as_i64()?,
    Value::String(s) => s.trim().parse::<i64>().ok()?,
    _ => return None,
  };
  u8::try_from(n).ok().filter(|p| *p <= 100)
}

/// Local hour at which daytime maximums are published; minimums sit at 00:00.
const DAYTIME_HOUR: u32 = 9;

fn temp_type_at(target: &DateTime<FixedOffset>) -> TempType {
  if target.hour() < DAYTIME_HOUR { TempType::Low } else { TempType::High }
}

/// Midnight opening the local day of `instant`, in the same offset.
fn local_midnight(instant: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
  instant
    .date_naive()
    .and_time(NaiveTime::MIN)
    .and_local_timezone(*instant.offset())
    .single()
    .unwrap_or(*instant)
}

/// Where a weekly minimum or maximum sits on its day, matching the instants
/// the short-range `temps` series uses so both series share keys.
fn weekly_temp_target(day: &DateTime<FixedOffset>, temp_type: TempType) -> DateTime<FixedOffset> {
  let midnight = local_midnight(day);
  match temp_type {
    TempType::Low => midnight,
    TempType::High => midnight + TimeDelta::hours(i64::from(DAYTIME_HOUR)),
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// The facts of one report, ready to be stored under its publishing office.
#[derive(Debug, Clone)]
pub struct NormalizedReport {
  pub publishing_office: String,
  pub report_datetime:   DateTime<FixedOffset>,
  pub facts:             Vec<FactRow>,
}

/// Everything the normalizer emitted or dropped for one document.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
  pub reports:             Vec<NormalizedReport>,
  /// Series blocks with no recognised shape.
  pub unrecognized_series: usize,
  /// Area codes dropped because the index does not know them.
  pub unresolved_areas:    BTreeSet<String>,
  /// Reports missing their office or publication time, or undecodable.
  pub malformed_reports:   usize,
  /// Facts dropped because an earlier report of the same document already
  /// emitted their key, e.g. a weekly temperature for a short-range day.
  pub overlapping_facts:   usize,
}

impl Normalized {
  /// All facts across reports, in emission order.
  pub fn rows(&self) -> impl Iterator<Item = &FactRow> {
    self.reports.iter().flat_map(|r| r.facts.iter())
  }

  pub fn fact_count(&self) -> usize { self.reports.iter().map(|r| r.facts.len()).sum() }
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
  /// Emit facts for area codes absent from the index (e.g. observation
  /// points) instead of dropping them.
  pub admit_unknown_areas: bool,
}

/// Turns forecast documents into fact rows, resolving areas against an
/// [`AreaIndex`].
pub struct Normalizer<'a> {
  index:   &'a AreaIndex,
  options: NormalizeOptions,
}

impl<'a> Normalizer<'a> {
  pub fn new(index: &'a AreaIndex) -> Self {
    Self { index, options: NormalizeOptions::default() }
  }

  pub fn with_options(index: &'a AreaIndex, options: NormalizeOptions) -> Self {
    Self { index, options }
  }

  pub fn normalize(&self, document: &ForecastDocument) -> Normalized {
    let mut out = Normalized::default();

    for position in 0..document.len() {
      let Some(kind) = ReportKind::from_index(position) else {
        tracing::debug!(position, "ignoring report beyond the weekly report");
        continue;
      };

      let report = match document.report(position) {
        Some(Ok(report)) => report,
        Some(Err(e)) => {
          tracing::warn!(position, error = %e, "undecodable report");
          out.malformed_reports += 1;
          continue;
        }
        None => continue,
      };

      if let Some(normalized) = self.normalize_report(&report, kind, &mut out) {
        out.reports.push(normalized);
      }
    }

    // The weekly report repeats days the short-range report already covers.
    // The first report to emit a key keeps it.
    let mut seen = HashSet::new();
    for report in &mut out.reports {
      let before = report.facts.len();
      let office = report.publishing_office.clone();
      report.facts.retain(|f| seen.insert((office.clone(), f.natural_key())));
      out.overlapping_facts += before - report.facts.len();
    }
    if out.overlapping_facts > 0 {
      tracing::debug!(
        overlapping = out.overlapping_facts,
        "dropped facts already emitted by an earlier report"
      );
    }

    out
  }

  fn normalize_report(
    &self,
    report: &Report,
    kind: ReportKind,
    out: &mut Normalized,
  ) -> Option<NormalizedReport> {
    let Some(office) = report.publishing_office.clone().filter(|o| !o.trim().is_empty())
    else {
      tracing::warn!(?kind, "report has no publishingOffice");
      out.malformed_reports += 1;
      return None;
    };

    let report_datetime = match report
      .report_datetime
      .as_deref()
      .map(parse_instant)
    {
      Some(Ok(dt)) => dt,
      other => {
        tracing::warn!(?kind, ?other, "report has no usable reportDatetime");
        out.malformed_reports += 1;
        return None;
      }
    };

    let mut emit = Emitter { normalizer: self, report_datetime, facts: Vec::new(), out };

    // A report without `timeSeries` simply contributes no timed facts.
    for series in report.time_series.iter().flatten() {
      match classify(series, kind) {
        Some(shape) => emit.series(series, shape),
        None => {
          tracing::debug!(?kind, "dropping unrecognised series");
          emit.out.unrecognized_series += 1;
        }
      }
    }

    if kind == ReportKind::Weekly {
      if let Some(block) = &report.temp_average {
        emit.averages(block, ClimateKind::Temperature);
      }
      if let Some(block) = &report.precip_average {
        emit.averages(block, ClimateKind::Precipitation);
      }
    }

    Some(NormalizedReport {
      publishing_office: office,
      report_datetime,
      facts: emit.facts,
    })
  }

  /// Resolve a document area, or `None` if it must be dropped.
  fn resolve(&self, area: &DocArea) -> Option<AreaRef> {
    match self.index.get(&area.code) {
      Some(known) => Some(AreaRef {
        code:  area.code.clone(),
        name:  area.name.clone().or_else(|| known.name.clone()),
        level: Some(known.level),
      }),
      None if self.options.admit_unknown_areas => Some(AreaRef {
        code:  area.code.clone(),
        name:  area.name.clone(),
        level: None,
      }),
      None => None,
    }
  }
}

/// Accumulates the facts of one report.
struct Emitter<'n, 'o> {
  normalizer:      &'n Normalizer<'n>,
  report_datetime: DateTime<FixedOffset>,
  facts:           Vec<FactRow>,
  out:             &'o mut Normalized,
}

impl Emitter<'_, '_> {
  fn area(&mut self, area: &DocArea) -> Option<AreaRef> {
    let resolved = self.normalizer.resolve(area);
    if resolved.is_none() && self.out.unresolved_areas.insert(area.code.clone()) {
      tracing::debug!(code = %area.code, "dropping facts for unresolvable area");
    }
    resolved
  }

  fn series(&mut self, series: &TimeSeries, shape: SeriesShape) {
    let report_datetime = self.report_datetime;

    for entry in &series.areas {
      let Some(area) = self.area(&entry.area) else { continue };

      for slot in align(&series.time_defines, entry) {
        match shape {
          SeriesShape::Weather => self.facts.push(FactRow::Weather(WeatherFact {
            report_datetime,
            area:            area.clone(),
            target_datetime: slot.target,
            weather_code:    slot.text("weatherCodes"),
            weather_text:    slot.text("weathers"),
            wind_text:       slot.text("winds"),
            wave_text:       slot.text("waves"),
          })),

          SeriesShape::Precipitation => {
            self.facts.push(FactRow::Precipitation(PrecipitationFact {
              report_datetime,
              area:            area.clone(),
              target_datetime: slot.target,
              probability:     slot.percent("pops"),
            }))
          }

          SeriesShape::Temperature => {
            self.facts.push(FactRow::Temperature(TemperatureFact {
              report_datetime,
              area:              area.clone(),
              target_datetime:   slot.target,
              temp_type:         temp_type_at(&slot.target),
              temperature:       slot.real("temps"),
              temperature_upper: None,
              temperature_lower: None,
            }))
          }

          SeriesShape::Weekly => self.facts.push(FactRow::Weekly(WeeklyFact {
            report_datetime,
            area:                      area.clone(),
            target_date:               slot.target.date_naive(),
            day_start:                 local_midnight(&slot.target),
            weather_code:              slot.text("weatherCodes"),
            precipitation_probability: slot.percent("pops"),
            reliability:               slot.text("reliabilities"),
          })),

          SeriesShape::WeeklyTemperature => {
            for (temp_type, value, upper, lower) in [
              (TempType::Low, "tempsMin", "tempsMinUpper", "tempsMinLower"),
              (TempType::High, "tempsMax", "tempsMaxUpper", "tempsMaxLower"),
            ] {
              self.facts.push(FactRow::Temperature(TemperatureFact {
                report_datetime,
                area: area.clone(),
                target_datetime: weekly_temp_target(&slot.target, temp_type),
                temp_type,
                temperature: slot.real(value),
                temperature_upper: slot.real(upper),
                temperature_lower: slot.real(lower),
              }));
            }
          }
        }
      }
    }
  }

  fn averages(&mut self, block: &AverageBlock, kind: ClimateKind) {
    for entry in &block.areas {
      let Some(area) = self.area(&entry.area) else { continue };
      self.facts.push(FactRow::ClimateAverage(ClimateAverageFact {
        report_datetime: self.report_datetime,
        area,
        kind,
        min_value: entry.min.as_ref().and_then(cell_real),
        max_value: entry.max.as_ref().and_then(cell_real),
      }));
    }
  }
}
