//! Site identity and data kinds.
//!
//! Both end up interpolated into SQL identifiers, so a [`SiteId`] can only be
//! built through validation and [`DataKind`] is a closed enum.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_SITE_ID_LEN: usize = 32;

// ─── SiteId ───────────────────────────────────────────────────────────────────

/// Identifier of a monitoring site: 1 to 32 ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
  pub fn new(id: impl Into<String>) -> Result<Self> {
    let id = id.into();
    let valid = !id.is_empty()
      && id.len() <= MAX_SITE_ID_LEN
      && id.bytes().all(|b| b.is_ascii_alphanumeric());
    if valid { Ok(Self(id)) } else { Err(Error::InvalidSiteId(id)) }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for SiteId {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::new(value) }
}

impl From<SiteId> for String {
  fn from(value: SiteId) -> Self { value.0 }
}

impl FromStr for SiteId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::new(s) }
}

impl fmt::Display for SiteId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── DataKind ─────────────────────────────────────────────────────────────────

/// The reporting cadence of a stream of readings. Each kind has its own live
/// table per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
  Realtime,
  Minutely,
  Hourly,
  Daily,
}

impl DataKind {
  pub const ALL: [DataKind; 4] =
    [DataKind::Realtime, DataKind::Minutely, DataKind::Hourly, DataKind::Daily];

  /// The name used in configuration, URLs and coordination messages.
  pub fn as_str(self) -> &'static str {
    match self {
      DataKind::Realtime => "realtime",
      DataKind::Minutely => "minutely",
      DataKind::Hourly => "hourly",
      DataKind::Daily => "daily",
    }
  }

  /// The token used inside physical table names (`<site>_<token>data`).
  pub fn table_token(self) -> &'static str {
    match self {
      DataKind::Realtime => "rt",
      DataKind::Minutely => "minute",
      DataKind::Hourly => "hour",
      DataKind::Daily => "day",
    }
  }
}

impl FromStr for DataKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    DataKind::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| Error::UnknownDataKind(s.to_owned()))
  }
}

impl fmt::Display for DataKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn site_id_rejects_sql_metacharacters() {
    assert!(SiteId::new("s001").is_ok());
    assert!(SiteId::new("").is_err());
    assert!(SiteId::new("s1; DROP TABLE x").is_err());
    assert!(SiteId::new("s_1").is_err());
    assert!(SiteId::new("a".repeat(33)).is_err());
  }

  #[test]
  fn site_id_deserialization_validates() {
    let ok: SiteId = serde_json::from_str("\"abc123\"").unwrap();
    assert_eq!(ok.as_str(), "abc123");
    assert!(serde_json::from_str::<SiteId>("\"a-b\"").is_err());
  }

  #[test]
  fn data_kind_names_parse_back() {
    for kind in DataKind::ALL {
      assert_eq!(kind.as_str().parse::<DataKind>().unwrap(), kind);
    }
    assert!("weekly".parse::<DataKind>().is_err());
  }
}
