//! Physical table naming and status parsing.
//!
//! The table name *is* the durable state of the tiering engine: there is no
//! metadata table. Status is always re-derived by parsing names.
//!
//! | Table | Name |
//! |-------|------|
//! | live | `<site>_<token>data` |
//! | staging | `<live>_rotating` |
//! | archive bucket | `<live>_<YYYYMMDD begin>_<YYYYMMDD end>` |
//! | reactivation in flight | `<bucket>_activating` |
//! | promotion copy target | `<bucket>_promoting` |
//! | promoted, queryable | `<bucket>_active` |
//! | demoted original | `<bucket>_activated` |

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
  DataKind, Error, Result, SiteId,
  period::{Window, midnight},
};

pub const ROTATING_SUFFIX: &str = "_rotating";
pub const PROMOTING_SUFFIX: &str = "_promoting";

const DATE_FORMAT: &str = "%Y%m%d";

pub fn live_table(site: &SiteId, kind: DataKind) -> String {
  format!("{site}_{}data", kind.table_token())
}

pub fn staging_table(site: &SiteId, kind: DataKind) -> String {
  format!("{}{ROTATING_SUFFIX}", live_table(site, kind))
}

pub fn bucket_table(live: &str, begin: NaiveDate, end: NaiveDate) -> String {
  format!("{live}_{}_{}", begin.format(DATE_FORMAT), end.format(DATE_FORMAT))
}

pub fn promoting_table(bucket: &str) -> String { format!("{bucket}{PROMOTING_SUFFIX}") }

// ─── Status ───────────────────────────────────────────────────────────────────

/// Status of an archive table, derived from its name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
  /// Dormant cold bucket.
  Archived,
  /// Rows are being copied out for promotion; not queryable.
  Activating,
  /// The original bucket, kept while its promoted copy is live.
  Activated,
  /// The promoted, live-shaped replacement of a bucket.
  Active,
}

impl TableStatus {
  pub fn suffix(self) -> &'static str {
    match self {
      TableStatus::Archived => "",
      TableStatus::Activating => "_activating",
      TableStatus::Activated => "_activated",
      TableStatus::Active => "_active",
    }
  }

  fn from_suffix(s: &str) -> Option<Self> {
    [TableStatus::Archived, TableStatus::Activating, TableStatus::Activated, TableStatus::Active]
      .into_iter()
      .find(|status| status.suffix() == s)
  }

  /// Activating or active: the bucket must eventually be rolled back.
  pub fn is_running(self) -> bool {
    matches!(self, TableStatus::Activating | TableStatus::Active)
  }
}

// ─── ArchiveTable ─────────────────────────────────────────────────────────────

/// One physical archive table as seen in the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTable {
  /// Physical name, including any status suffix.
  pub name:   String,
  /// The plain bucket name (`<live>_<begin>_<end>`).
  pub base:   String,
  pub begin:  NaiveDate,
  /// Exclusive end of the data the bucket covers.
  pub end:    NaiveDate,
  pub status: TableStatus,
}

impl ArchiveTable {
  /// Parse `name` as an archive table belonging to the live table `live`.
  pub fn parse(live: &str, name: &str) -> Result<Self> {
    let invalid = || Error::InvalidTableName(name.to_owned());

    let rest = name
      .strip_prefix(live)
      .and_then(|r| r.strip_prefix('_'))
      .ok_or_else(invalid)?;

    // `YYYYMMDD_YYYYMMDD` is 17 ASCII bytes; anything after is the suffix.
    if rest.len() < 17 || !rest.is_char_boundary(17) || rest.as_bytes()[8] != b'_' {
      return Err(invalid());
    }
    let (dates, suffix) = rest.split_at(17);
    let (begin, end) = (&dates[..8], &dates[9..]);
    if !begin.bytes().chain(end.bytes()).all(|b| b.is_ascii_digit()) {
      return Err(invalid());
    }

    let begin = NaiveDate::parse_from_str(begin, DATE_FORMAT).map_err(|_| invalid())?;
    let end = NaiveDate::parse_from_str(end, DATE_FORMAT).map_err(|_| invalid())?;
    let status = TableStatus::from_suffix(suffix).ok_or_else(invalid)?;
    if end <= begin {
      return Err(invalid());
    }

    Ok(Self {
      name: name.to_owned(),
      base: name[..name.len() - suffix.len()].to_owned(),
      begin,
      end,
      status,
    })
  }

  /// The name this bucket's table takes in `status`.
  pub fn name_with(&self, status: TableStatus) -> String {
    format!("{}{}", self.base, status.suffix())
  }

  pub fn window(&self) -> Window { Window { begin: self.begin, end: self.end } }

  /// Whether the bucket's covered range intersects `[begin, end)`.
  pub fn overlaps(&self, begin: NaiveDateTime, end: NaiveDateTime) -> bool {
    midnight(self.begin) < end && begin < midnight(self.end)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn names_follow_convention() {
    let site = SiteId::new("s001").unwrap();
    let live = live_table(&site, DataKind::Hourly);
    assert_eq!(live, "s001_hourdata");
    assert_eq!(staging_table(&site, DataKind::Hourly), "s001_hourdata_rotating");
    assert_eq!(
      bucket_table(&live, day(2024, 1, 1), day(2024, 2, 1)),
      "s001_hourdata_20240101_20240201"
    );
    assert_eq!(live_table(&site, DataKind::Realtime), "s001_rtdata");
  }

  #[test]
  fn parse_plain_bucket() {
    let t = ArchiveTable::parse("s001_hourdata", "s001_hourdata_20240101_20240116").unwrap();
    assert_eq!(t.base, "s001_hourdata_20240101_20240116");
    assert_eq!(t.begin, day(2024, 1, 1));
    assert_eq!(t.end, day(2024, 1, 16));
    assert_eq!(t.status, TableStatus::Archived);
  }

  #[test]
  fn parse_status_suffixes() {
    let live = "s001_daydata";
    for (suffix, status) in [
      ("_activating", TableStatus::Activating),
      ("_activated", TableStatus::Activated),
      ("_active", TableStatus::Active),
    ] {
      let name = format!("{live}_20230101_20240101{suffix}");
      let t = ArchiveTable::parse(live, &name).unwrap();
      assert_eq!(t.status, status);
      assert_eq!(t.base, "s001_daydata_20230101_20240101");
      assert_eq!(t.name_with(TableStatus::Archived), t.base);
    }
  }

  #[test]
  fn parse_rejects_foreign_names() {
    let live = "s001_hourdata";
    for name in [
      "s001_hourdata",
      "s001_hourdata_rotating",
      "s001_hourdata_20240101_20240201_promoting",
      "s001_hourdata_2024010_20240201",
      "s001_hourdata_20240101-20240201",
      "s001_hourdata_20241301_20250101",
      "s001_hourdata_20240201_20240101",
      "s001_daydata_20240101_20240201",
      "s0011_hourdata_20240101_20240201",
    ] {
      assert!(ArchiveTable::parse(live, name).is_err(), "{name} should not parse");
    }
  }

  #[test]
  fn overlap_is_closed_open() {
    let t = ArchiveTable::parse("s1_hourdata", "s1_hourdata_20240201_20240301").unwrap();
    let at = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
    assert!(t.overlaps(at("2024-01-01 00:00:00"), at("2024-02-01 00:00:01")));
    assert!(!t.overlaps(at("2024-01-01 00:00:00"), at("2024-02-01 00:00:00")));
    assert!(!t.overlaps(at("2024-03-01 00:00:00"), at("2024-04-01 00:00:00")));
  }

  #[test]
  fn running_statuses() {
    assert!(TableStatus::Activating.is_running());
    assert!(TableStatus::Active.is_running());
    assert!(!TableStatus::Activated.is_running());
    assert!(!TableStatus::Archived.is_running());
  }
}
