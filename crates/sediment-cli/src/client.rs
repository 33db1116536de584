//! Async HTTP client wrapping the sediment admin API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Response};
use sediment_core::{ArchiveTable, DataKind, SiteId};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Async HTTP client for the sediment JSON API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client:   Client,
  base_url: String,
}

impl ApiClient {
  pub fn new(base_url: impl Into<String>) -> Result<Self> {
    // Immediate rotations and activations can run for a while.
    let client = Client::builder()
      .timeout(Duration::from_secs(300))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  async fn send(&self, what: &str, req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await.with_context(|| format!("{what} failed"))?;
    if resp.status().is_success() {
      return Ok(resp);
    }
    let status = resp.status();
    let message = resp
      .json::<Value>()
      .await
      .ok()
      .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
      .unwrap_or_default();
    Err(anyhow!("{what} → {status}: {message}"))
  }

  async fn json<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T> {
    self
      .send(what, req)
      .await?
      .json()
      .await
      .with_context(|| format!("deserialising response to {what}"))
  }

  /// `GET /health`
  pub async fn health(&self) -> Result<Value> {
    self.json("GET /health", self.client.get(self.url("/health"))).await
  }

  /// `POST /sites/{site}/rotate`
  pub async fn rotate(&self, site: &SiteId, immediate: bool) -> Result<()> {
    let path = format!("/sites/{site}/rotate");
    let req = self.client.post(self.url(&path)).query(&[("immediate", immediate)]);
    self.send(&format!("POST {path}"), req).await.map(drop)
  }

  /// `GET /sites/{site}/{kind}/archives`
  pub async fn archives(&self, site: &SiteId, kind: DataKind) -> Result<Vec<ArchiveTable>> {
    let path = format!("/sites/{site}/{kind}/archives");
    self.json(&format!("GET {path}"), self.client.get(self.url(&path))).await
  }

  /// `DELETE /sites/{site}/{kind}/archives`
  pub async fn clear(&self, site: &SiteId, kind: DataKind) -> Result<()> {
    let path = format!("/sites/{site}/{kind}/archives");
    self.send(&format!("DELETE {path}"), self.client.delete(self.url(&path))).await.map(drop)
  }

  /// `POST /sites/{site}/{kind}/archives/{table}/activate`
  pub async fn activate(&self, site: &SiteId, kind: DataKind, table: &str) -> Result<()> {
    let path = format!("/sites/{site}/{kind}/archives/{table}/activate");
    self.send(&format!("POST {path}"), self.client.post(self.url(&path))).await.map(drop)
  }

  /// `POST /sites/{site}/{kind}/archives/{table}/touch`
  pub async fn touch(&self, site: &SiteId, kind: DataKind, table: &str) -> Result<()> {
    let path = format!("/sites/{site}/{kind}/archives/{table}/touch");
    self.send(&format!("POST {path}"), self.client.post(self.url(&path))).await.map(drop)
  }

  /// `GET /sites/{site}/{kind}/tables?begin=&end=`
  pub async fn tables(
    &self,
    site: &SiteId,
    kind: DataKind,
    begin: &str,
    end: &str,
  ) -> Result<Vec<String>> {
    let path = format!("/sites/{site}/{kind}/tables");
    let req = self.client.get(self.url(&path)).query(&[("begin", begin), ("end", end)]);
    self.json(&format!("GET {path}"), req).await
  }
}
