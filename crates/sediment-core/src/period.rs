//! Calendar periods and the bucket windows derived from them.
//!
//! All arithmetic is on naive local time: monitoring rows carry the local
//! wall-clock time of the measurement, and bucket boundaries are local
//! midnights.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A calendar span used both for the live retention horizon and for the width
/// of archive buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
  Week,
  Month,
  Quarter,
  Year,
}

/// A closed-open date range `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
  pub begin: NaiveDate,
  pub end:   NaiveDate,
}

impl Window {
  pub fn begin_time(&self) -> NaiveDateTime { midnight(self.begin) }

  pub fn end_time(&self) -> NaiveDateTime { midnight(self.end) }

  pub fn contains(&self, t: NaiveDateTime) -> bool {
    t >= self.begin_time() && t < self.end_time()
  }
}

impl Period {
  fn months(self) -> Option<u32> {
    match self {
      Period::Week => None,
      Period::Month => Some(1),
      Period::Quarter => Some(3),
      Period::Year => Some(12),
    }
  }

  /// `t` moved back by one period. Month arithmetic clamps to the end of the
  /// shorter month (`03-31` minus a month is `02-29` or `02-28`).
  pub fn before(self, t: NaiveDateTime) -> Result<NaiveDateTime> {
    match self.months() {
      None => t.checked_sub_days(Days::new(7)),
      Some(n) => t.checked_sub_months(Months::new(n)),
    }
    .ok_or(Error::DateOutOfRange)
  }

  /// The first day of the period that contains `t`. Weeks start on Monday.
  pub fn start_of(self, t: NaiveDateTime) -> Result<NaiveDate> {
    let d = t.date();
    let start = match self {
      Period::Week => d.checked_sub_days(Days::new(u64::from(d.weekday().num_days_from_monday()))),
      Period::Month => NaiveDate::from_ymd_opt(d.year(), d.month(), 1),
      Period::Quarter => NaiveDate::from_ymd_opt(d.year(), (d.month() - 1) / 3 * 3 + 1, 1),
      Period::Year => NaiveDate::from_ymd_opt(d.year(), 1, 1),
    };
    start.ok_or(Error::DateOutOfRange)
  }

  /// The day one period after `begin`.
  pub fn after(self, begin: NaiveDate) -> Result<NaiveDate> {
    match self.months() {
      None => begin.checked_add_days(Days::new(7)),
      Some(n) => begin.checked_add_months(Months::new(n)),
    }
    .ok_or(Error::DateOutOfRange)
  }

  /// The bucket window of this width that contains `t`.
  pub fn window_containing(self, t: NaiveDateTime) -> Result<Window> {
    let begin = self.start_of(t)?;
    let end = self.after(begin)?;
    Ok(Window { begin, end })
  }
}

pub fn midnight(d: NaiveDate) -> NaiveDateTime { d.and_time(chrono::NaiveTime::MIN) }
