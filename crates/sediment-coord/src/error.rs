//! Error type for `sediment-coord`.

use sediment_core::{Classify, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("malformed message: {0}")]
  Json(#[from] serde_json::Error),

  #[error("malformed frame: {0}")]
  Frame(String),

  #[error("unknown message type {0}")]
  UnknownMessageType(u8),

  #[error("unexpected {0} message")]
  UnexpectedMessage(&'static str),

  #[error("not connected to the archive worker")]
  NotConnected,

  #[error("archive worker did not answer within {0:?}")]
  Timeout(std::time::Duration),

  /// The worker answered with a failure `Ack`.
  #[error("archive worker refused: {message}")]
  Rejected { class: ErrorClass, message: String },

  #[error("unix sockets are not supported on this platform")]
  UnixUnsupported,
}

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Error::Rejected { class, .. } => *class,
      Error::NotConnected | Error::Timeout(_) | Error::Io(_) => ErrorClass::Unavailable,
      _ => ErrorClass::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
