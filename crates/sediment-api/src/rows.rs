//! Handlers for `/sites/{site}/{kind}/rows`.
//!
//! | Method | Notes |
//! |--------|-------|
//! | `POST` | Body: [`Reading`]; inserts, returns 201 + `{"id": ...}` |
//! | `PUT`  | Body: [`Reading`]; updates the row with the same `data_time` and `device`, or inserts |
//!
//! Every successful write requests a debounced rotation for the site.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use sediment_core::{ArchiveControl, Reading, SiteId};
use serde_json::json;
use tracing::warn;

use crate::{AppState, error::ApiError, parse_target};

/// `POST /sites/{site}/{kind}/rows`
pub async fn insert<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind)): Path<(String, String)>,
  Json(reading): Json<Reading>,
) -> Result<impl IntoResponse, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  let id = state.store.insert_row(&site, kind, reading).await?;
  request_rotation(&state.control, site).await;
  Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// `PUT /sites/{site}/{kind}/rows`
pub async fn upsert<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind)): Path<(String, String)>,
  Json(reading): Json<Reading>,
) -> Result<impl IntoResponse, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  let id = state.store.upsert_row(&site, kind, reading).await?;
  request_rotation(&state.control, site).await;
  Ok(Json(json!({ "id": id })))
}

/// The row is already stored; a lost trigger is picked up by the next one.
async fn request_rotation<A: ArchiveControl>(control: &A, site: SiteId) {
  if let Err(e) = control.trigger_rotation(site.clone(), false).await {
    warn!(%site, error = %e, "rotation trigger dropped");
  }
}
