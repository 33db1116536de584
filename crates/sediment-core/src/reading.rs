//! Monitoring readings as handed over by device decoders.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Storage format of `data_time`; lexicographic order equals time order.
pub const DATA_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_data_time(t: NaiveDateTime) -> String { t.format(DATA_TIME_FORMAT).to_string() }

pub fn parse_data_time(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, DATA_TIME_FORMAT)
    .map_err(|_| Error::InvalidDataTime(s.to_owned()))
}

/// A single measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
  Number(f64),
  /// Text and flag columns (e.g. validity markers).
  Text(String),
}

/// One row destined for a live table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
  pub data_time: NaiveDateTime,
  #[serde(default)]
  pub device:    String,
  /// Measurement columns; missing columns are added to the live table.
  #[serde(default)]
  pub values:    BTreeMap<String, ColumnValue>,
}

impl Reading {
  pub fn new(data_time: NaiveDateTime) -> Self {
    Self { data_time, device: String::new(), values: BTreeMap::new() }
  }

  pub fn with(mut self, column: impl Into<String>, value: ColumnValue) -> Self {
    self.values.insert(column.into(), value);
    self
  }
}

/// Columns the engine manages itself and which readings may not set.
pub const RESERVED_COLUMNS: [&str; 3] = ["id", "data_time", "device"];

/// Accept `[A-Za-z_][A-Za-z0-9_]*`, excluding reserved columns.
pub fn validate_column(name: &str) -> Result<()> {
  let mut bytes = name.bytes();
  let head_ok = bytes
    .next()
    .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
  let ok = head_ok
    && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
    && name.len() <= 64
    && !RESERVED_COLUMNS.iter().any(|r| r.eq_ignore_ascii_case(name));
  if ok { Ok(()) } else { Err(Error::InvalidColumn(name.to_owned())) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn column_names() {
    assert!(validate_column("pm25").is_ok());
    assert!(validate_column("so2_flag").is_ok());
    assert!(validate_column("2pm").is_err());
    assert!(validate_column("a b").is_err());
    assert!(validate_column("ID").is_err());
    assert!(validate_column("data_time").is_err());
    assert!(validate_column("").is_err());
  }

  #[test]
  fn reading_json_shape() {
    let r: Reading = serde_json::from_str(
      r#"{"data_time":"2024-02-01T00:00:00","values":{"pm25":12.5,"pm25_flag":"N"}}"#,
    )
    .unwrap();
    assert_eq!(format_data_time(r.data_time), "2024-02-01 00:00:00");
    assert_eq!(r.values["pm25"], ColumnValue::Number(12.5));
    assert_eq!(r.values["pm25_flag"], ColumnValue::Text("N".into()));
    assert_eq!(r.device, "");
  }
}
