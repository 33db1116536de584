//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode},
};
use sediment_core::{DataKind, Period, RotationPolicy, SiteId, SitePolicies};
use sediment_store_sqlite::{Archiver, Catalog, RollbackTimers, SqliteStore};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{AppState, router};

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let catalog = Arc::new(Catalog::new(store.clone()));
  let policies = SitePolicies::new().with(
    SiteId::new("s1").unwrap(),
    RotationPolicy::new(DataKind::Realtime, Period::Week, Period::Month),
  );
  let archiver =
    Archiver::new(store.clone(), policies, catalog.clone(), Arc::new(RollbackTimers::new()));
  router(AppState { store, catalog, control: archiver })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let req = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(body) => req
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => req.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, json)
}

fn old_reading() -> Value {
  json!({ "data_time": "2001-01-03T10:00:00", "device": "d1", "values": { "temp": 1.5 } })
}

// ── Health ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_ok() {
  let app = app().await;
  let (status, body) = send(&app, "GET", "/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "ok");
}

// ── Rows ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_then_upsert_same_row() {
  let app = app().await;
  let (status, created) = send(&app, "POST", "/sites/s1/realtime/rows", Some(old_reading())).await;
  assert_eq!(status, StatusCode::CREATED);

  let update = json!({ "data_time": "2001-01-03T10:00:00", "device": "d1", "values": { "temp": 2.0 } });
  let (status, updated) = send(&app, "PUT", "/sites/s1/realtime/rows", Some(update)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(created["id"], updated["id"]);
}

#[tokio::test]
async fn bad_path_segments_are_rejected() {
  let app = app().await;
  let (status, body) = send(&app, "POST", "/sites/s-1/realtime/rows", Some(old_reading())).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());

  let (status, _) = send(&app, "GET", "/sites/s1/weekly/archives", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reserved_columns_are_rejected() {
  let app = app().await;
  let reading = json!({ "data_time": "2001-01-03T10:00:00", "values": { "id": 4 } });
  let (status, _) = send(&app, "POST", "/sites/s1/realtime/rows", Some(reading)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Tiering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn immediate_rotation_creates_a_bucket() {
  let app = app().await;
  send(&app, "POST", "/sites/s1/realtime/rows", Some(old_reading())).await;

  let (status, _) = send(&app, "POST", "/sites/s1/rotate?immediate=true", None).await;
  assert_eq!(status, StatusCode::OK);

  let (status, archives) = send(&app, "GET", "/sites/s1/realtime/archives", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(archives[0]["name"], "s1_rtdata_20010101_20010104");
  assert_eq!(archives[0]["status"], "archived");

  let (_, tables) = send(
    &app,
    "GET",
    "/sites/s1/realtime/tables?begin=2001-01-01&end=2001-02-01",
    None,
  )
  .await;
  assert_eq!(tables, json!(["s1_rtdata", "s1_rtdata_20010101_20010104"]));
}

#[tokio::test]
async fn deferred_rotation_is_accepted() {
  let app = app().await;
  let (status, body) = send(&app, "POST", "/sites/s1/rotate", None).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body["immediate"], false);
}

#[tokio::test]
async fn activating_twice_conflicts() {
  let app = app().await;
  send(&app, "POST", "/sites/s1/realtime/rows", Some(old_reading())).await;
  send(&app, "POST", "/sites/s1/rotate?immediate=true", None).await;

  let uri = "/sites/s1/realtime/archives/s1_rtdata_20010101_20010104/activate";
  let (status, _) = send(&app, "POST", uri, None).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  let (status, body) = send(&app, "POST", uri, None).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("already activated"));
}

#[tokio::test]
async fn activating_a_missing_bucket_is_not_found() {
  let app = app().await;
  let uri = "/sites/s1/realtime/archives/s1_rtdata_20010101_20010104/activate";
  let (status, _) = send(&app, "POST", uri, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn touch_and_clear_succeed() {
  let app = app().await;
  let (status, _) =
    send(&app, "POST", "/sites/s1/realtime/archives/s1_rtdata_20010101_20010104/touch", None)
      .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = send(&app, "DELETE", "/sites/s1/realtime/archives", None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn empty_range_is_rejected() {
  let app = app().await;
  let (status, _) = send(
    &app,
    "GET",
    "/sites/s1/realtime/tables?begin=2001-02-01&end=2001-01-01",
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) =
    send(&app, "GET", "/sites/s1/realtime/tables?begin=yesterday&end=2001-01-01", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
