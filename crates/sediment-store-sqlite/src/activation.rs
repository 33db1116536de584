//! Activation / rollback workflow: temporarily promote an archive bucket back
//! into a live-shaped, queryable table.
//!
//! `bucket` → `bucket_activating` (synchronously), then in the background the
//! rows are copied into `bucket_promoting`; on completion both tables are
//! renamed in one transaction to `bucket_active` and `bucket_activated`.
//! Rollback drops `bucket_active` and restores the plain bucket name.

use sediment_core::{
  ArchiveTable, DataKind, SiteId, TableStatus,
  naming::{live_table, promoting_table, staging_table},
  policy::DEFAULT_BATCH_SIZE,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
  Archiver, Error, Result,
  ddl::{self, quote},
};

/// Outcome of a completed activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
  /// Name of the promoted table (`<bucket>_active`).
  pub table:     String,
  pub rows:      u64,
  /// Live columns the bucket lacked, filled with type defaults.
  pub defaulted: Vec<String>,
}

pub type ActivationHandle = JoinHandle<Result<ActivationReport>>;

/// Everything the promotion copy needs, fixed before the first batch.
struct CopyPlan {
  columns:   String,
  select:    String,
  defaulted: Vec<String>,
  total:     u64,
}

impl Archiver {
  /// Validate and start activating `table`. Returns once the bucket has been
  /// marked `_activating`; the copy runs on the returned handle.
  pub async fn start_activation(
    &self,
    site: &SiteId,
    kind: DataKind,
    table: &str,
  ) -> Result<ActivationHandle> {
    let buckets = self.buckets(site, kind).await?;
    let bucket = buckets
      .iter()
      .find(|t| t.name == table || t.base == table)
      .cloned()
      .ok_or_else(|| Error::NotExists(table.to_owned()))?;

    let staging = staging_table(site, kind);
    if self.store().table_exists(&staging).await? {
      return Err(Error::RotationInProgress(staging));
    }
    if bucket.status != TableStatus::Archived {
      return Err(Error::AlreadyActivated(bucket.base));
    }

    let activating = bucket.name_with(TableStatus::Activating);
    self.rename_table(&bucket.name, &activating).await?;
    self.catalog().invalidate(site, kind);
    info!(%site, %kind, table = %bucket.name, "archive activation started");

    let batch_size = self.policy(site, kind).map_or(DEFAULT_BATCH_SIZE, |p| p.batch_size);
    let this = self.clone();
    let site = site.clone();
    Ok(tokio::spawn(async move {
      let result = this.promote(&site, kind, &bucket, batch_size).await;
      match &result {
        Ok(report) => {
          info!(%site, %kind, table = %report.table, rows = report.rows, "archive activated");
          this.arm_rollback(&site, kind);
        }
        Err(e) => {
          error!(%site, %kind, table = %bucket.base, error = %e, "archive activation failed; undoing");
          if let Err(undo) = this.undo_activation(&bucket).await {
            error!(table = %bucket.base, error = %undo, "activation undo failed");
          }
        }
      }
      this.catalog().invalidate(&site, kind);
      result
    }))
  }

  async fn promote(
    &self,
    site: &SiteId,
    kind: DataKind,
    bucket: &ArchiveTable,
    batch_size: u32,
  ) -> Result<ActivationReport> {
    let live = live_table(site, kind);
    let activating = bucket.name_with(TableStatus::Activating);
    let promoting = promoting_table(&bucket.base);

    let plan = {
      let (live, activating, promoting) = (live.clone(), activating.clone(), promoting.clone());
      self
        .store()
        .conn()
        .call(move |conn| {
          ddl::drop_table(conn, &promoting)?;
          let target = ddl::create_like(conn, &live, &promoting)?;
          let source = ddl::columns(conn, &activating)?;
          let (select, defaulted) = ddl::column_map(&target, &source);
          let total = ddl::count_rows(conn, &activating)?;
          Ok(CopyPlan {
            columns: ddl::column_list(&target),
            select,
            defaulted,
            total: u64::try_from(total).unwrap_or_default(),
          })
        })
        .await?
    };

    // The source is stable while `_activating`, so paginate by offset and
    // finish when the copied count reaches the total.
    let mut copied = 0u64;
    while copied < plan.total {
      let sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} ORDER BY id LIMIT ?1 OFFSET ?2",
        quote(&promoting),
        plan.columns,
        plan.select,
        quote(&activating)
      );
      let offset = copied;
      let rows = self
        .store()
        .conn()
        .call(move |conn| Ok(conn.execute(&sql, rusqlite::params![batch_size, offset])?))
        .await?;
      if rows == 0 {
        return Err(Error::CopyIncomplete { table: promoting, copied, total: plan.total });
      }
      copied += rows as u64;
    }

    let active = bucket.name_with(TableStatus::Active);
    let activated = bucket.name_with(TableStatus::Activated);
    {
      let active = active.clone();
      self
        .store()
        .conn()
        .call(move |conn| {
          let tx = conn.transaction()?;
          ddl::rename(&tx, &promoting, &active)?;
          ddl::rename(&tx, &activating, &activated)?;
          tx.commit()?;
          Ok(())
        })
        .await?;
    }

    if !plan.defaulted.is_empty() {
      info!(table = %active, columns = ?plan.defaulted, "columns missing from archive were defaulted");
    }
    Ok(ActivationReport { table: active, rows: copied, defaulted: plan.defaulted })
  }

  /// Best-effort undo of a failed activation: drop the promotion target and
  /// give the bucket its plain name back.
  async fn undo_activation(&self, bucket: &ArchiveTable) -> Result<()> {
    let activating = bucket.name_with(TableStatus::Activating);
    let promoting = promoting_table(&bucket.base);
    let base = bucket.base.clone();
    self
      .store()
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        ddl::drop_table(&tx, &promoting)?;
        if ddl::table_exists(&tx, &activating)? {
          ddl::rename(&tx, &activating, &base)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Demote every active bucket of `(site, kind)`: drop the promoted table and
  /// restore the original bucket name. Returns the restored bucket names.
  pub async fn rollback(&self, site: &SiteId, kind: DataKind) -> Result<Vec<String>> {
    // Bypass the cache: rollback acts on ground truth.
    self.catalog().invalidate(site, kind);
    let listing = self.catalog().list(site, kind).await?;

    let mut restored = Vec::new();
    for table in listing.tables.iter().filter(|t| t.status == TableStatus::Active) {
      let active = table.name.clone();
      let activated = table.name_with(TableStatus::Activated);
      let base = table.base.clone();
      let result = self
        .store()
        .conn()
        .call(move |conn| {
          let tx = conn.transaction()?;
          // Without the original the promoted table is the only copy.
          if !ddl::table_exists(&tx, &activated)? {
            return Ok(false);
          }
          ddl::drop_table(&tx, &active)?;
          ddl::rename(&tx, &activated, &base)?;
          tx.commit()?;
          Ok(true)
        })
        .await;
      match result {
        Ok(true) => restored.push(table.base.clone()),
        Ok(false) => error!(
          table = %table.name,
          "original bucket missing; keeping promoted table"
        ),
        Err(e) => warn!(table = %table.name, error = %e, "failed to roll back archive table"),
      }
    }

    self.catalog().invalidate(site, kind);
    Ok(restored)
  }

  pub(crate) async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
    let (from, to) = (from.to_owned(), to.to_owned());
    self
      .store()
      .conn()
      .call(move |conn| {
        ddl::rename(conn, &from, &to)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
