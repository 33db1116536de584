//! `POST /sites/{site}/rotate[?immediate=true]`

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use sediment_core::ArchiveControl;
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, error::ApiError, parse_site};

#[derive(Debug, Default, Deserialize)]
pub struct RotateParams {
  /// Run now instead of at the next debounce slot. Default `false`.
  #[serde(default)]
  pub immediate: bool,
}

/// Returns 200 once an immediate pass has finished, 202 when deferred.
pub async fn trigger<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path(site): Path<String>,
  Query(params): Query<RotateParams>,
) -> Result<impl IntoResponse, ApiError> {
  let site = parse_site(&site)?;
  state
    .control
    .trigger_rotation(site.clone(), params.immediate)
    .await
    .map_err(ApiError::control)?;
  let status = if params.immediate { StatusCode::OK } else { StatusCode::ACCEPTED };
  Ok((status, Json(json!({ "site": site, "immediate": params.immediate }))))
}
