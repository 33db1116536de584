//! [`Archiver`]: the worker-side tiering engine and its [`ArchiveControl`]
//! implementation.
//!
//! The catalog and the rollback-timer registry are injected so independent
//! engines can coexist in one process (tests run several side by side).

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use sediment_core::{
  ArchiveControl, ArchiveTable, DataKind, RotationPolicy, SiteId, SitePolicies,
  policy::DEFAULT_REACTIVATION_TIMEOUT,
};
use tracing::{info, warn};

use crate::{Catalog, Error, Result, RollbackTimers, RotationScheduler, SqliteStore};

/// Local wall-clock time, the time base of `data_time`.
pub(crate) fn now() -> NaiveDateTime { Local::now().naive_local() }

/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Archiver {
  inner: Arc<Inner>,
}

struct Inner {
  store:     SqliteStore,
  policies:  SitePolicies,
  catalog:   Arc<Catalog>,
  timers:    Arc<RollbackTimers>,
  scheduler: RotationScheduler,
}

impl Archiver {
  pub fn new(
    store: SqliteStore,
    policies: SitePolicies,
    catalog: Arc<Catalog>,
    timers: Arc<RollbackTimers>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        policies,
        catalog,
        timers,
        scheduler: RotationScheduler::new(),
      }),
    }
  }

  pub fn store(&self) -> &SqliteStore { &self.inner.store }

  pub fn catalog(&self) -> &Arc<Catalog> { &self.inner.catalog }

  pub fn timers(&self) -> &Arc<RollbackTimers> { &self.inner.timers }

  pub fn policies(&self) -> &SitePolicies { &self.inner.policies }

  /// Sites with a deferred rotation waiting to run.
  pub fn pending_rotations(&self) -> usize { self.inner.scheduler.pending() }

  pub(crate) fn policy(&self, site: &SiteId, kind: DataKind) -> Result<&RotationPolicy> {
    self
      .inner
      .policies
      .get(site, kind)
      .ok_or_else(|| Error::NoPolicy { site: site.clone(), kind })
  }

  /// Catalog listing for `(site, kind)`. A listing freshly derived from the
  /// database re-arms rollback timers for running buckets that have none, so
  /// a bucket left activated by a previous process still expires.
  pub async fn buckets(&self, site: &SiteId, kind: DataKind) -> Result<Arc<[ArchiveTable]>> {
    let listing = self.inner.catalog.list(site, kind).await?;
    if !listing.from_cache
      && listing.tables.iter().any(|t| t.status.is_running())
      && !self.inner.timers.is_armed(site, kind)
    {
      info!(%site, %kind, "running archive bucket discovered; arming rollback timer");
      self.arm_rollback(site, kind);
    }
    Ok(listing.tables)
  }

  /// (Re)start the rollback countdown for `(site, kind)`.
  pub fn arm_rollback(&self, site: &SiteId, kind: DataKind) {
    let timeout = self
      .inner
      .policies
      .get(site, kind)
      .map_or(DEFAULT_REACTIVATION_TIMEOUT, |p| p.reactivation_timeout);
    let this = self.clone();
    let (s, k) = (site.clone(), kind);
    self.inner.timers.arm(site.clone(), kind, timeout, async move {
      match this.rollback(&s, k).await {
        Ok(restored) => info!(site = %s, kind = %k, ?restored, "archive rollback complete"),
        Err(e) => warn!(site = %s, kind = %k, error = %e, "archive rollback failed"),
      }
    });
  }

  /// Handle a rotation request. An immediate request runs every kind of the
  /// site now and reports the first failure; otherwise the request is
  /// debounced.
  pub async fn trigger_rotation_at(
    &self,
    site: SiteId,
    immediate: bool,
    at: NaiveDateTime,
  ) -> Result<()> {
    if immediate {
      let results = self.rotate(&site).await;
      return results.into_iter().map(|(_, r)| r.map(drop)).collect();
    }

    let this = self.clone();
    let run_site = site.clone();
    let scheduled = self.inner.scheduler.schedule(site.clone(), at, async move {
      this.rotate(&run_site).await;
    });
    if scheduled.coalesced() {
      tracing::debug!(
        %site,
        queued = scheduled.queued,
        delay_secs = scheduled.delay.as_secs(),
        "rotation already pending; request coalesced"
      );
    } else {
      info!(%site, delay_secs = scheduled.delay.as_secs(), "rotation scheduled");
    }
    Ok(())
  }
}

impl ArchiveControl for Archiver {
  type Error = Error;

  async fn trigger_rotation(&self, site: SiteId, immediate: bool) -> Result<()> {
    self.trigger_rotation_at(site, immediate, now()).await
  }

  async fn activate_archive(&self, site: SiteId, kind: DataKind, table: String) -> Result<()> {
    // The copy continues in the background; its outcome is logged there.
    self.start_activation(&site, kind, &table).await.map(drop)
  }

  async fn trigger_archive_rollback(
    &self,
    site: SiteId,
    kind: DataKind,
    table: String,
  ) -> Result<()> {
    tracing::debug!(%site, %kind, %table, "archive table touched; resetting rollback timer");
    self.arm_rollback(&site, kind);
    Ok(())
  }

  async fn clear_archive_table(&self, site: SiteId, kind: DataKind) -> Result<()> {
    self.inner.catalog.invalidate(&site, kind);
    Ok(())
  }
}
