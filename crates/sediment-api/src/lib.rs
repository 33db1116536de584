//! JSON admin and ingestion API for Sediment.
//!
//! Exposes an axum [`Router`] over the live tables and the tiering engine.
//! Tiering requests go through any [`ArchiveControl`]: the worker passes its
//! `Archiver`, followers pass a coordination `Follower`, and the handlers
//! cannot tell the difference.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = sediment_api::router(AppState { store, catalog, control });
//! axum::serve(listener, app).await?;
//! ```

pub mod archives;
pub mod error;
pub mod rotation;
pub mod rows;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use sediment_core::{ArchiveControl, DataKind, SiteId};
use sediment_store_sqlite::{Catalog, SqliteStore};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct AppState<A> {
  pub store:   SqliteStore,
  pub catalog: Arc<Catalog>,
  pub control: A,
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router<A>(state: AppState<A>) -> Router
where
  A: ArchiveControl + Clone + 'static,
{
  Router::new()
    .route("/health", get(health))
    // Ingestion
    .route("/sites/{site}/{kind}/rows", post(rows::insert::<A>).put(rows::upsert::<A>))
    // Tiering
    .route("/sites/{site}/rotate", post(rotation::trigger::<A>))
    .route(
      "/sites/{site}/{kind}/archives",
      get(archives::list::<A>).delete(archives::clear::<A>),
    )
    .route("/sites/{site}/{kind}/archives/{table}/activate", post(archives::activate::<A>))
    .route("/sites/{site}/{kind}/archives/{table}/touch", post(archives::touch::<A>))
    .route("/sites/{site}/{kind}/tables", get(archives::tables::<A>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Path helpers ────────────────────────────────────────────────────────────

pub(crate) fn parse_site(site: &str) -> Result<SiteId, ApiError> {
  site.parse().map_err(|e: sediment_core::Error| ApiError::BadRequest(e.to_string()))
}

pub(crate) fn parse_target(site: &str, kind: &str) -> Result<(SiteId, DataKind), ApiError> {
  let kind = kind.parse().map_err(|e: sediment_core::Error| ApiError::BadRequest(e.to_string()))?;
  Ok((parse_site(site)?, kind))
}

#[cfg(test)]
mod tests;
