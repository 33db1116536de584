//! Error type for `sediment-store-sqlite`.

use sediment_core::{Classify, DataKind, ErrorClass, SiteId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sediment_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A staging table exists for this site/kind.
  #[error("rotation in progress ({0} exists)")]
  RotationInProgress(String),

  #[error("activation in progress for {site}/{kind}")]
  ActivationInProgress { site: SiteId, kind: DataKind },

  #[error("archive table {0} is already activated")]
  AlreadyActivated(String),

  #[error("table {0} does not exist")]
  NotExists(String),

  /// Rows archived into a bucket and rows removed from live/staging differ.
  /// The transaction that observed it has been rolled back.
  #[error(
    "consistency violation archiving into {table}: inserted {inserted}, \
     deleted {deleted_live} from live and {deleted_staging} from staging"
  )]
  Consistency {
    table:           String,
    inserted:        usize,
    deleted_live:    usize,
    deleted_staging: usize,
  },

  #[error("copy into {table} stopped at {copied} of {total} rows")]
  CopyIncomplete { table: String, copied: u64, total: u64 },

  #[error("no rotation policy for {site}/{kind}")]
  NoPolicy { site: SiteId, kind: DataKind },

  #[error("background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl Error {
  /// Precondition violations are reported to the caller and never retried.
  pub fn is_precondition(&self) -> bool {
    matches!(
      self,
      Error::RotationInProgress(_)
        | Error::ActivationInProgress { .. }
        | Error::AlreadyActivated(_)
        | Error::NotExists(_)
    )
  }
}

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Error::Core(e) => e.class(),
      Error::NotExists(_) | Error::NoPolicy { .. } => ErrorClass::NotFound,
      e if e.is_precondition() => ErrorClass::Precondition,
      _ => ErrorClass::Internal,
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Error::Database(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
