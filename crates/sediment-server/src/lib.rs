//! The `sedimentd` daemon: configuration and process wiring.
//!
//! Every process of a deployment opens the same SQLite database and serves
//! the HTTP API. Exactly one of them is configured as the archive worker: it
//! repairs interrupted tiering work at startup, owns the tiering engine and
//! listens for followers. The others forward tiering requests to it.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use sediment_api::AppState;
use sediment_coord::{Endpoint, Follower, Listener, TransportKind};
use sediment_core::{Role, RotationPolicy, SiteId, SitePolicies};
use sediment_store_sqlite::{Archiver, Catalog, RollbackTimers, SqliteStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from the TOML file and `SEDIMENT_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub store_path: PathBuf,
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default)]
  pub archive:    ArchiveConfig,
  #[serde(default)]
  pub sites:      Vec<SiteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
  #[serde(default)]
  pub is_archive_worker:       bool,
  #[serde(default)]
  pub worker_transport:        TransportKind,
  #[serde(default = "default_worker_address")]
  pub worker_address:          String,
  #[serde(default = "default_reconnect_interval")]
  pub reconnect_interval_secs: u64,
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs:    u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
  pub id:       SiteId,
  #[serde(default)]
  pub policies: Vec<RotationPolicy>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 7300 }

fn default_worker_address() -> String { "127.0.0.1:7400".to_owned() }

fn default_reconnect_interval() -> u64 { 5 }

fn default_request_timeout() -> u64 { 5 }

impl Default for ArchiveConfig {
  fn default() -> Self {
    Self {
      is_archive_worker:       false,
      worker_transport:        TransportKind::default(),
      worker_address:          default_worker_address(),
      reconnect_interval_secs: default_reconnect_interval(),
      request_timeout_secs:    default_request_timeout(),
    }
  }
}

impl ServerConfig {
  pub fn role(&self) -> Role { Role::from_flag(self.archive.is_archive_worker) }

  pub fn site_policies(&self) -> SitePolicies {
    let mut policies = SitePolicies::new();
    for site in &self.sites {
      for policy in &site.policies {
        policies.insert(site.id.clone(), policy.clone());
      }
    }
    policies
  }

  pub fn worker_endpoint(&self) -> Endpoint {
    Endpoint::new(self.archive.worker_transport, self.archive.worker_address.clone())
  }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Open the store and serve until the HTTP server or the coordination
/// listener stops, or the process receives Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
  let store_path = expand_tilde(&config.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let address = format!("{}:{}", config.host, config.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  let endpoint = config.worker_endpoint();

  match config.role() {
    Role::Worker => {
      let catalog = Arc::new(Catalog::new(store.clone()));
      let archiver = Archiver::new(
        store.clone(),
        config.site_policies(),
        catalog.clone(),
        Arc::new(RollbackTimers::new()),
      );
      archiver.recover().await.context("crash recovery failed")?;

      let coordination = Listener::bind(&endpoint)
        .await
        .with_context(|| format!("failed to bind coordination endpoint {endpoint}"))?;
      let app = sediment_api::router(AppState { store, catalog, control: archiver.clone() });

      info!(role = "worker", "listening on http://{address}");
      tokio::select! {
        result = sediment_coord::serve(coordination, archiver) => {
          result.context("coordination listener failed")
        }
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => {
          result.context("server error")
        }
      }
    }
    Role::Follower => {
      let catalog = Arc::new(Catalog::pass_through(store.clone()));
      let (follower, _connector) = Follower::spawn(
        endpoint,
        Duration::from_secs(config.archive.reconnect_interval_secs),
        Duration::from_secs(config.archive.request_timeout_secs),
      );
      let app = sediment_api::router(AppState { store, catalog, control: follower });

      info!(role = "follower", "listening on http://{address}");
      axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
    }
  }
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    info!("shutting down");
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use sediment_core::{DataKind, Period};

  use super::*;

  const EXAMPLE: &str = r#"
store_path = "/var/lib/sediment/telemetry.db"
host = "0.0.0.0"
port = 7300

[archive]
is_archive_worker = true
worker_transport = "unix"
worker_address = "/run/sediment/worker.sock"
reconnect_interval_secs = 2

[[sites]]
id = "s001"

[[sites.policies]]
kind = "hourly"
active_period = "month"
archive_period = "year"
batch_size = 1000
reactivation_timeout_secs = 600

[[sites.policies]]
kind = "realtime"
active_period = "week"
archive_period = "month"
"#;

  #[test]
  fn parses_full_config() {
    let config: ServerConfig = toml::from_str(EXAMPLE).unwrap();
    assert_eq!(config.role(), Role::Worker);
    assert_eq!(
      config.worker_endpoint(),
      Endpoint::Unix(PathBuf::from("/run/sediment/worker.sock"))
    );
    assert_eq!(config.archive.request_timeout_secs, 5);

    let policies = config.site_policies();
    let site = SiteId::new("s001").unwrap();
    let hourly = policies.get(&site, DataKind::Hourly).unwrap();
    assert_eq!(hourly.archive_period, Period::Year);
    assert_eq!(hourly.batch_size, 1000);
    assert_eq!(hourly.reactivation_timeout, Duration::from_secs(600));

    let realtime = policies.get(&site, DataKind::Realtime).unwrap();
    assert_eq!(realtime.batch_size, 5000);
    assert_eq!(realtime.reactivation_timeout, Duration::from_secs(1800));
  }

  #[test]
  fn minimal_config_is_a_tcp_follower() {
    let config: ServerConfig = toml::from_str(r#"store_path = "data.db""#).unwrap();
    assert_eq!(config.role(), Role::Follower);
    assert_eq!(config.worker_endpoint(), Endpoint::Tcp("127.0.0.1:7400".into()));
    assert_eq!(config.port, 7300);
    assert!(config.site_policies().sites().next().is_none());
  }

  #[test]
  fn invalid_site_id_is_rejected() {
    let bad = "store_path = \"x.db\"\n[[sites]]\nid = \"../etc\"\n";
    assert!(toml::from_str::<ServerConfig>(bad).is_err());
  }
}
