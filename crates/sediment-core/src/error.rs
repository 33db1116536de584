//! Error types for `sediment-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid site id: {0:?}")]
  InvalidSiteId(String),

  #[error("unknown data kind: {0:?}")]
  UnknownDataKind(String),

  #[error("invalid column name: {0:?}")]
  InvalidColumn(String),

  /// A table name that does not follow the archive naming convention.
  #[error("not an archive table name: {0:?}")]
  InvalidTableName(String),

  #[error("invalid data time {0:?}")]
  InvalidDataTime(String),

  #[error("date arithmetic out of range")]
  DateOutOfRange,
}

impl crate::Classify for Error {
  fn class(&self) -> crate::ErrorClass {
    match self {
      Error::DateOutOfRange => crate::ErrorClass::Internal,
      _ => crate::ErrorClass::InvalidInput,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
