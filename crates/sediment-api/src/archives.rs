//! Handlers for the archive buckets of one site and data kind.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/archives` | Catalog listing with statuses |
//! | `DELETE` | `/archives` | Drop the cached listing; 204 |
//! | `POST`   | `/archives/{table}/activate` | Start activation; 202 |
//! | `POST`   | `/archives/{table}/touch` | Reset the rollback countdown; 204 |
//! | `GET`    | `/tables?begin=&end=` | Tables a query over `[begin, end)` must read |
//!
//! All paths are relative to `/sites/{site}/{kind}`.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{NaiveDate, NaiveDateTime};
use sediment_core::{ArchiveControl, ArchiveTable, period::midnight, reading::parse_data_time};
use sediment_store_sqlite::resolve_tables_for_range;
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, error::ApiError, parse_target};

/// `GET /sites/{site}/{kind}/archives`
pub async fn list<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind)): Path<(String, String)>,
) -> Result<Json<Vec<ArchiveTable>>, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  let listing = state.catalog.list(&site, kind).await?;
  Ok(Json(listing.tables.to_vec()))
}

/// `DELETE /sites/{site}/{kind}/archives`
pub async fn clear<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  // Followers hold their own catalog; clear it as well as the worker's.
  state.catalog.invalidate(&site, kind);
  state.control.clear_archive_table(site, kind).await.map_err(ApiError::control)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /sites/{site}/{kind}/archives/{table}/activate`
///
/// Returns once the bucket is marked activating; the copy continues in the
/// background and shows up as an `active` table in the listing when done.
pub async fn activate<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind, table)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  state
    .control
    .activate_archive(site, kind, table.clone())
    .await
    .map_err(ApiError::control)?;
  Ok((StatusCode::ACCEPTED, Json(json!({ "table": table, "status": "activating" }))))
}

/// `POST /sites/{site}/{kind}/archives/{table}/touch`
pub async fn touch<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind, table)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  state
    .control
    .trigger_archive_rollback(site, kind, table)
    .await
    .map_err(ApiError::control)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Range resolution ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RangeParams {
  /// Inclusive start: `YYYY-MM-DD HH:MM:SS`, ISO 8601, or a bare date.
  pub begin: String,
  /// Exclusive end, same formats as `begin`.
  pub end:   String,
}

/// `GET /sites/{site}/{kind}/tables?begin=...&end=...`
pub async fn tables<A: ArchiveControl>(
  State(state): State<AppState<A>>,
  Path((site, kind)): Path<(String, String)>,
  Query(params): Query<RangeParams>,
) -> Result<Json<Vec<String>>, ApiError> {
  let (site, kind) = parse_target(&site, &kind)?;
  let begin = parse_time(&params.begin)?;
  let end = parse_time(&params.end)?;
  if begin >= end {
    return Err(ApiError::BadRequest(format!("empty range {} .. {}", params.begin, params.end)));
  }
  let tables =
    resolve_tables_for_range(&state.catalog, &state.control, &site, kind, begin, end).await?;
  Ok(Json(tables))
}

fn parse_time(s: &str) -> Result<NaiveDateTime, ApiError> {
  parse_data_time(s)
    .ok()
    .or_else(|| s.parse::<NaiveDateTime>().ok())
    .or_else(|| s.parse::<NaiveDate>().ok().map(midnight))
    .ok_or_else(|| ApiError::BadRequest(format!("invalid time {s:?}")))
}
