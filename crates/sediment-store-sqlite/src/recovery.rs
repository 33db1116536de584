//! Crash recovery, run once by the worker before it accepts requests.
//!
//! Every intermediate state the tiering engine can die in is repaired here:
//! a leftover staging table is dropped (rows still in live are the source of
//! truth), half-built promotion targets are dropped and buckets stuck in
//! `_activating` get their plain name back. Completed activations are left
//! alone; discovering them re-arms their rollback timers.

use sediment_core::{
  DataKind, SiteId, TableStatus,
  naming::{PROMOTING_SUFFIX, live_table, staging_table},
};
use tracing::{error, info, warn};

use crate::{Archiver, Result, ddl};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
  pub dropped:  Vec<String>,
  pub restored: Vec<String>,
}

impl RecoveryReport {
  pub fn is_empty(&self) -> bool { self.dropped.is_empty() && self.restored.is_empty() }
}

impl Archiver {
  /// Repair every configured `(site, kind)` pair.
  pub async fn recover(&self) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let sites: Vec<SiteId> = self.policies().sites().cloned().collect();
    for site in &sites {
      for kind in DataKind::ALL {
        self.recover_one(site, kind, &mut report).await?;
      }
    }
    if report.is_empty() {
      info!("recovery found nothing to repair");
    } else {
      info!(dropped = ?report.dropped, restored = ?report.restored, "recovery complete");
    }
    Ok(report)
  }

  async fn recover_one(
    &self,
    site: &SiteId,
    kind: DataKind,
    report: &mut RecoveryReport,
  ) -> Result<()> {
    let live = live_table(site, kind);
    let staging = staging_table(site, kind);

    let (dropped, pending) = {
      let live = live.clone();
      self
        .store()
        .conn()
        .call(move |conn| {
          let mut dropped = Vec::new();
          if ddl::table_exists(conn, &staging)? {
            ddl::drop_table(conn, &staging)?;
            dropped.push(staging);
          }
          let names = ddl::tables_with_prefix(conn, &format!("{live}_"))?;
          for name in names.iter().filter(|n| n.ends_with(PROMOTING_SUFFIX)) {
            ddl::drop_table(conn, name)?;
            dropped.push(name.clone());
          }
          Ok((dropped, names))
        })
        .await?
    };
    for name in &dropped {
      warn!(%site, %kind, table = %name, "dropped leftover table");
    }
    report.dropped.extend(dropped);

    let stuck: Vec<_> = crate::parse_listing(&live, &pending)
      .into_iter()
      .filter(|t| t.status == TableStatus::Activating)
      .collect();
    for table in stuck {
      if self.store().table_exists(&table.base).await? {
        error!(
          %site, %kind, table = %table.name,
          "cannot restore activating bucket: base name already taken"
        );
        continue;
      }
      self.rename_table(&table.name, &table.base).await?;
      warn!(%site, %kind, table = %table.base, "restored bucket interrupted mid-activation");
      report.restored.push(table.base);
    }

    self.catalog().invalidate(site, kind);
    // A fresh listing arms rollback timers for buckets still running.
    self.buckets(site, kind).await?;
    Ok(())
  }
}
