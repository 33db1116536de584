//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use sediment_core::{Classify, ErrorClass};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[from] sediment_store_sqlite::Error),

  /// A tiering request refused or failed by the `ArchiveControl`.
  #[error("{source}")]
  Control {
    class:  ErrorClass,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl ApiError {
  pub fn control<E>(e: E) -> Self
  where
    E: Classify + std::error::Error + Send + Sync + 'static,
  {
    ApiError::Control { class: e.class(), source: Box::new(e) }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Store(e) => status_for(e.class()),
      ApiError::Control { class, .. } => status_for(*class),
    }
  }
}

fn status_for(class: ErrorClass) -> StatusCode {
  match class {
    ErrorClass::Precondition => StatusCode::CONFLICT,
    ErrorClass::NotFound => StatusCode::NOT_FOUND,
    ErrorClass::InvalidInput => StatusCode::BAD_REQUEST,
    ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
