//! Area taxonomy: the flattened region → office → subdivision hierarchy.
//!
//! The upstream publishes the taxonomy as one document with five buckets
//! (`centers`, `offices`, `class10s`, `class15s`, `class20s`). [`AreaIndex`]
//! folds them into a single lookup keyed by area code, tagging every entry
//! with the bucket it came from. The index is built once and handed to every
//! consumer that needs area resolution.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Level ───────────────────────────────────────────────────────────────────

/// The granularity of an area, coarsest first.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AreaLevel {
  Region,
  Office,
  Subdivision10,
  Subdivision15,
  Subdivision20,
}

impl AreaLevel {
  pub const ALL: [AreaLevel; 5] = [
    AreaLevel::Region,
    AreaLevel::Office,
    AreaLevel::Subdivision10,
    AreaLevel::Subdivision15,
    AreaLevel::Subdivision20,
  ];

  /// Name of the taxonomy bucket this level is read from.
  pub fn bucket(self) -> &'static str {
    match self {
      Self::Region => "centers",
      Self::Office => "offices",
      Self::Subdivision10 => "class10s",
      Self::Subdivision15 => "class15s",
      Self::Subdivision20 => "class20s",
    }
  }

  /// The discriminant stored in the database.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Region => "region",
      Self::Office => "office",
      Self::Subdivision10 => "subdivision10",
      Self::Subdivision15 => "subdivision15",
      Self::Subdivision20 => "subdivision20",
    }
  }

  /// The immediately coarser level, or `None` for the root.
  pub fn parent_level(self) -> Option<AreaLevel> {
    match self {
      Self::Region => None,
      Self::Office => Some(Self::Region),
      Self::Subdivision10 => Some(Self::Office),
      Self::Subdivision15 => Some(Self::Subdivision10),
      Self::Subdivision20 => Some(Self::Subdivision15),
    }
  }
}

impl fmt::Display for AreaLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AreaLevel {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    AreaLevel::ALL
      .into_iter()
      .find(|l| l.as_str() == s || l.bucket() == s)
      .ok_or_else(|| Error::UnknownLevel(s.to_string()))
  }
}

// ─── Area ────────────────────────────────────────────────────────────────────

/// One node of the taxonomy. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
  pub code:        String,
  /// Records lacking a name are kept with `None` rather than dropped.
  pub name:        Option<String>,
  pub en_name:     Option<String>,
  pub level:       AreaLevel,
  pub parent_code: Option<String>,
  pub child_codes: Vec<String>,
  /// Name of the responsible office; regions and offices only.
  pub office_name: Option<String>,
  /// Reading of the name; finest subdivisions only.
  pub kana:        Option<String>,
}

// ─── Raw taxonomy document ───────────────────────────────────────────────────

/// A single record inside one of the taxonomy buckets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyRecord {
  pub name:        Option<String>,
  pub en_name:     Option<String>,
  pub parent:      Option<String>,
  #[serde(default)]
  pub children:    Vec<String>,
  pub office_name: Option<String>,
  pub kana:        Option<String>,
}

/// The taxonomy document as published upstream. Any bucket may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Taxonomy {
  pub centers:  Option<BTreeMap<String, TaxonomyRecord>>,
  pub offices:  Option<BTreeMap<String, TaxonomyRecord>>,
  pub class10s: Option<BTreeMap<String, TaxonomyRecord>>,
  pub class15s: Option<BTreeMap<String, TaxonomyRecord>>,
  pub class20s: Option<BTreeMap<String, TaxonomyRecord>>,
}

impl Taxonomy {
  fn bucket(&self, level: AreaLevel) -> Option<&BTreeMap<String, TaxonomyRecord>> {
    match level {
      AreaLevel::Region => self.centers.as_ref(),
      AreaLevel::Office => self.offices.as_ref(),
      AreaLevel::Subdivision10 => self.class10s.as_ref(),
      AreaLevel::Subdivision15 => self.class15s.as_ref(),
      AreaLevel::Subdivision20 => self.class20s.as_ref(),
    }
  }
}

// ─── Consistency report ──────────────────────────────────────────────────────

/// A structural problem found by [`AreaIndex::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
  /// `parent_code` does not resolve to any area.
  MissingParent { code: String, parent: String },
  /// `parent_code` resolves, but not to the immediately coarser level.
  ParentLevelMismatch {
    code:     String,
    parent:   String,
    expected: AreaLevel,
    found:    AreaLevel,
  },
  /// A parent lists a child whose own `parent_code` points elsewhere.
  ChildNotBackReferenced { parent: String, child: String },
  /// A parent lists a child code that is not in the index.
  UnknownChild { parent: String, child: String },
}

impl fmt::Display for Inconsistency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MissingParent { code, parent } => {
        write!(f, "area {code}: parent {parent} not found")
      }
      Self::ParentLevelMismatch { code, parent, expected, found } => write!(
        f,
        "area {code}: parent {parent} is {found}, expected {expected}"
      ),
      Self::ChildNotBackReferenced { parent, child } => {
        write!(f, "area {parent}: child {child} does not point back")
      }
      Self::UnknownChild { parent, child } => {
        write!(f, "area {parent}: child {child} not found")
      }
    }
  }
}

// ─── Index ───────────────────────────────────────────────────────────────────

/// Flat lookup from area code to [`Area`].
#[derive(Debug, Clone, Default)]
pub struct AreaIndex {
  areas: BTreeMap<String, Area>,
}

impl AreaIndex {
  /// Parse a taxonomy document and build the index.
  pub fn from_json_str(s: &str) -> Result<Self> {
    let taxonomy: Taxonomy = serde_json::from_str(s)?;
    Ok(Self::load(&taxonomy))
  }

  /// Flatten all buckets of `taxonomy` into one lookup.
  ///
  /// Codes are unique across buckets; on a collision the coarser bucket
  /// keeps the code.
  pub fn load(taxonomy: &Taxonomy) -> Self {
    let mut areas = BTreeMap::new();

    for level in AreaLevel::ALL {
      let Some(bucket) = taxonomy.bucket(level) else {
        tracing::debug!(bucket = level.bucket(), "taxonomy bucket missing, skipping");
        continue;
      };

      for (code, record) in bucket {
        if areas.contains_key(code) {
          tracing::warn!(%code, bucket = level.bucket(), "duplicate area code, skipping");
          continue;
        }
        areas.insert(code.clone(), area_from_record(code, level, record));
      }
    }

    Self { areas }
  }

  pub fn get(&self, code: &str) -> Option<&Area> { self.areas.get(code) }

  pub fn contains(&self, code: &str) -> bool { self.areas.contains_key(code) }

  pub fn len(&self) -> usize { self.areas.len() }

  pub fn is_empty(&self) -> bool { self.areas.is_empty() }

  /// All areas, ordered by code.
  pub fn iter(&self) -> impl Iterator<Item = &Area> { self.areas.values() }

  /// Codes of every area at `level`, ordered by code.
  pub fn codes_at(&self, level: AreaLevel) -> Vec<String> {
    self
      .areas
      .values()
      .filter(|a| a.level == level)
      .map(|a| a.code.clone())
      .collect()
  }

  /// Names of the office-level areas reachable through the `children` list of
  /// the region called `region_name`, in listed order.
  ///
  /// Unknown regions yield an empty list; unnamed or unknown children are
  /// skipped.
  pub fn resolve_children(&self, region_name: &str) -> Vec<String> {
    let Some(region) = self.areas.values().find(|a| {
      a.level == AreaLevel::Region && a.name.as_deref() == Some(region_name)
    }) else {
      return Vec::new();
    };

    region
      .child_codes
      .iter()
      .filter_map(|code| self.areas.get(code))
      .filter(|child| child.level == AreaLevel::Office)
      .filter_map(|child| child.name.clone())
      .collect()
  }

  /// Check parent/child links in both directions.
  pub fn validate(&self) -> Vec<Inconsistency> {
    let mut problems = Vec::new();

    for area in self.areas.values() {
      if let (Some(parent_code), Some(expected)) =
        (&area.parent_code, area.level.parent_level())
      {
        match self.areas.get(parent_code) {
          None => problems.push(Inconsistency::MissingParent {
            code:   area.code.clone(),
            parent: parent_code.clone(),
          }),
          Some(parent) if parent.level != expected => {
            problems.push(Inconsistency::ParentLevelMismatch {
              code: area.code.clone(),
              parent: parent_code.clone(),
              expected,
              found: parent.level,
            })
          }
          Some(_) => {}
        }
      }

      for child_code in &area.child_codes {
        match self.areas.get(child_code) {
          None => problems.push(Inconsistency::UnknownChild {
            parent: area.code.clone(),
            child:  child_code.clone(),
          }),
          Some(child) if child.parent_code.as_deref() != Some(area.code.as_str()) => {
            problems.push(Inconsistency::ChildNotBackReferenced {
              parent: area.code.clone(),
              child:  child_code.clone(),
            })
          }
          Some(_) => {}
        }
      }
    }

    problems
  }
}

fn area_from_record(code: &str, level: AreaLevel, record: &TaxonomyRecord) -> Area {
  let keeps_office_name = matches!(level, AreaLevel::Region | AreaLevel::Office);

  Area {
    code:        code.to_string(),
    name:        record.name.clone(),
    en_name:     record.en_name.clone(),
    level,
    parent_code: level.parent_level().and(record.parent.clone()),
    child_codes: record.children.clone(),
    office_name: keeps_office_name.then(|| record.office_name.clone()).flatten(),
    kana:        (level == AreaLevel::Subdivision20)
      .then(|| record.kana.clone())
      .flatten(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TAXONOMY: &str = include_str!("../fixtures/taxonomy.json");

  fn fixture() -> AreaIndex { AreaIndex::from_json_str(TAXONOMY).unwrap() }

  #[test]
  fn single_office_record() {
    let index = AreaIndex::from_json_str(
      r#"{"offices":{"130000":{"name":"東京都","parent":"010100"}}}"#,
    )
    .unwrap();

    let area = index.get("130000").unwrap();
    assert_eq!(area.code, "130000");
    assert_eq!(area.name.as_deref(), Some("東京都"));
    assert_eq!(area.level, AreaLevel::Office);
    assert_eq!(area.parent_code.as_deref(), Some("010100"));
    assert!(area.child_codes.is_empty());
  }

  #[test]
  fn levels_match_source_buckets() {
    let index = fixture();
    assert_eq!(index.get("010300").unwrap().level, AreaLevel::Region);
    assert_eq!(index.get("140000").unwrap().level, AreaLevel::Office);
    assert_eq!(index.get("130010").unwrap().level, AreaLevel::Subdivision10);
    assert_eq!(index.get("130011").unwrap().level, AreaLevel::Subdivision15);
    assert_eq!(index.get("1310100").unwrap().level, AreaLevel::Subdivision20);
    assert_eq!(index.len(), 10);
  }

  #[test]
  fn every_non_root_parent_resolves() {
    let index = fixture();
    for area in index.iter() {
      if area.level == AreaLevel::Region {
        assert!(area.parent_code.is_none());
        continue;
      }
      let parent = area.parent_code.as_deref().unwrap();
      assert!(index.contains(parent), "{} -> {parent}", area.code);
    }
    assert!(index.validate().is_empty());
  }

  #[test]
  fn bucket_specific_fields() {
    let index = fixture();
    let chiyoda = index.get("1310100").unwrap();
    assert_eq!(chiyoda.kana.as_deref(), Some("ちよだく"));
    assert!(chiyoda.office_name.is_none());

    let tokyo = index.get("130000").unwrap();
    assert_eq!(tokyo.office_name.as_deref(), Some("気象庁"));
    assert_eq!(tokyo.en_name.as_deref(), Some("Tokyo"));
    assert_eq!(tokyo.child_codes, ["130010", "130020"]);
  }

  #[test]
  fn nameless_record_is_kept() {
    let index = AreaIndex::from_json_str(
      r#"{"class10s":{"999910":{"enName":"Nowhere","parent":"999900"}}}"#,
    )
    .unwrap();
    let area = index.get("999910").unwrap();
    assert!(area.name.is_none());
    assert_eq!(area.en_name.as_deref(), Some("Nowhere"));
  }

  #[test]
  fn missing_buckets_are_tolerated() {
    let index = AreaIndex::from_json_str("{}").unwrap();
    assert!(index.is_empty());
  }

  #[test]
  fn root_parent_is_ignored() {
    let index = AreaIndex::from_json_str(
      r#"{"centers":{"010100":{"name":"北海道地方","parent":"000000"}}}"#,
    )
    .unwrap();
    assert!(index.get("010100").unwrap().parent_code.is_none());
  }

  #[test]
  fn resolve_children_follows_listed_order() {
    let index = fixture();
    assert_eq!(index.resolve_children("関東甲信地方"), ["東京都", "神奈川県"]);
    assert_eq!(index.resolve_children("東海地方"), ["愛知県"]);
    assert!(index.resolve_children("存在しない地方").is_empty());
  }

  #[test]
  fn codes_at_level() {
    let index = fixture();
    assert_eq!(index.codes_at(AreaLevel::Office), ["130000", "140000", "230000"]);
  }

  #[test]
  fn validate_reports_broken_links() {
    let index = AreaIndex::from_json_str(
      r#"{
        "centers": {"010300": {"name": "関東甲信地方", "children": ["130000", "190000"]}},
        "offices": {
          "130000": {"name": "東京都", "parent": "010300"},
          "140000": {"name": "神奈川県", "parent": "130010"}
        },
        "class10s": {"130010": {"name": "東京地方", "parent": "139999"}}
      }"#,
    )
    .unwrap();

    let problems = index.validate();
    assert!(problems.contains(&Inconsistency::UnknownChild {
      parent: "010300".into(),
      child:  "190000".into(),
    }));
    assert!(problems.contains(&Inconsistency::MissingParent {
      code:   "130010".into(),
      parent: "139999".into(),
    }));
    assert!(problems.contains(&Inconsistency::ParentLevelMismatch {
      code:     "140000".into(),
      parent:   "130010".into(),
      expected: AreaLevel::Region,
      found:    AreaLevel::Subdivision10,
    }));
    assert_eq!(problems.len(), 3);
  }

  #[test]
  fn child_pointing_elsewhere_is_flagged() {
    let index = AreaIndex::from_json_str(
      r#"{
        "centers": {
          "010300": {"name": "関東甲信地方", "children": ["130000"]},
          "010400": {"name": "東海地方"}
        },
        "offices": {"130000": {"name": "東京都", "parent": "010400"}}
      }"#,
    )
    .unwrap();

    assert_eq!(index.validate(), [Inconsistency::ChildNotBackReferenced {
      parent: "010300".into(),
      child:  "130000".into(),
    }]);
  }

  #[test]
  fn level_parses_from_either_spelling() {
    assert_eq!("office".parse::<AreaLevel>().unwrap(), AreaLevel::Office);
    assert_eq!("class15s".parse::<AreaLevel>().unwrap(), AreaLevel::Subdivision15);
    assert!("prefecture".parse::<AreaLevel>().is_err());
  }
}
