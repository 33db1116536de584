//! Rotation Engine: moves aged rows from a live table into archive buckets.
//!
//! Rows are first *copied* into the staging table in id order, batch by
//! batch. Each batch is then archived bucket window by bucket window; every
//! window is one transaction that inserts into the bucket and deletes the
//! same rows from live and staging, checking the counts agree. A crash at any
//! point leaves rows either in live alone or in live and staging, never in
//! staging alone, so the staging table is always safe to drop.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDateTime};
use rusqlite::OptionalExtension as _;
use sediment_core::{
  ArchiveTable, DataKind, Period, RotationPolicy, SiteId, TableStatus, Window,
  naming::{bucket_table, live_table, staging_table},
  reading::{format_data_time, parse_data_time},
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
  Archiver, Error, Result,
  archiver::now,
  ddl::{self, quote},
};

/// Outcome of one `rotate_one` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
  pub batches:       u64,
  pub rows_archived: u64,
  /// Final names of the buckets written to.
  pub buckets:       BTreeSet<String>,
}

impl RotationReport {
  pub fn is_empty(&self) -> bool { self.batches == 0 }
}

/// A batch copied into staging.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StagedBatch {
  pub rows:   usize,
  pub max_id: i64,
}

/// Result of one archive transaction.
enum WindowOutcome {
  Archived { table: ArchiveTable, replaced: Option<String>, rows: usize },
  Empty,
  Mismatch { table: String, inserted: usize, deleted_live: usize, deleted_staging: usize },
}

impl Archiver {
  /// Rotate every configured kind of `site`. Kinds run concurrently; a
  /// failure in one is logged and does not affect the others.
  pub async fn rotate(&self, site: &SiteId) -> Vec<(DataKind, Result<RotationReport>)> {
    let policies = self.policies().for_site(site).to_vec();
    if policies.is_empty() {
      warn!(%site, "rotation requested for a site without rotation policies");
    }

    let mut set = JoinSet::new();
    for policy in policies {
      let this = self.clone();
      let site = site.clone();
      set.spawn(async move {
        let result = this.rotate_one(&site, &policy).await;
        (policy.kind, result)
      });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
      match joined {
        Ok((kind, result)) => {
          match &result {
            Ok(report) if report.is_empty() => debug!(%site, %kind, "nothing to rotate"),
            Ok(report) => info!(
              %site,
              %kind,
              batches = report.batches,
              rows = report.rows_archived,
              buckets = ?report.buckets,
              "rotation complete"
            ),
            Err(e) if e.is_precondition() => warn!(%site, %kind, error = %e, "rotation skipped"),
            Err(e) => error!(%site, %kind, error = %e, "rotation failed"),
          }
          results.push((kind, result));
        }
        Err(e) => error!(%site, error = %e, "rotation task panicked"),
      }
    }
    results.sort_by_key(|(kind, _)| *kind);
    results
  }

  pub async fn rotate_one(&self, site: &SiteId, policy: &RotationPolicy) -> Result<RotationReport> {
    self.rotate_one_at(site, policy, now()).await
  }

  /// One rotation pass for `(site, policy.kind)` as of `at`.
  pub async fn rotate_one_at(
    &self,
    site: &SiteId,
    policy: &RotationPolicy,
    at: NaiveDateTime,
  ) -> Result<RotationReport> {
    let kind = policy.kind;
    let live = live_table(site, kind);
    let staging = staging_table(site, kind);

    if self.store().table_exists(&staging).await? {
      return Err(Error::RotationInProgress(staging));
    }
    let buckets = self.buckets(site, kind).await?;
    if buckets.iter().any(|t| t.status != TableStatus::Archived) {
      return Err(Error::ActivationInProgress { site: site.clone(), kind });
    }

    let cutoff = policy.active_period.before(at)?;
    if !self.has_rows_before(&live, cutoff).await? {
      return Ok(RotationReport::default());
    }

    debug!(%site, %kind, cutoff = %cutoff, "starting rotation");
    self.create_staging(&live, &staging).await?;

    let result = self.drain(&live, &staging, cutoff, policy, buckets.to_vec()).await;

    // Whatever is left in staging is still present in live.
    if let Err(e) = self.drop_table(&staging).await {
      warn!(table = %staging, error = %e, "failed to drop staging table");
    }
    self.catalog().invalidate(site, kind);
    result
  }

  async fn drain(
    &self,
    live: &str,
    staging: &str,
    cutoff: NaiveDateTime,
    policy: &RotationPolicy,
    mut buckets: Vec<ArchiveTable>,
  ) -> Result<RotationReport> {
    let mut report = RotationReport::default();
    let mut last_id = 0;

    while let Some(batch) = self.stage_batch(live, staging, cutoff, last_id, policy.batch_size).await? {
      report.batches += 1;
      last_id = batch.max_id;
      debug!(table = %live, rows = batch.rows, last_id, "batch staged");
      self
        .archive_staged(live, staging, policy.archive_period, &mut buckets, &mut report)
        .await?;
    }
    Ok(report)
  }

  /// Archive everything currently in staging, window by window, oldest
  /// first. The cursor is re-derived from staging after every window, so
  /// gaps in the data never produce empty buckets.
  pub(crate) async fn archive_staged(
    &self,
    live: &str,
    staging: &str,
    period: Period,
    buckets: &mut Vec<ArchiveTable>,
    report: &mut RotationReport,
  ) -> Result<()> {
    while let Some(oldest) = self.oldest_staged(staging).await? {
      let window = period.window_containing(oldest)?;
      let existing = buckets.iter().find(|b| b.begin == window.begin).cloned();

      match self.archive_window(live, staging, window, existing).await? {
        WindowOutcome::Archived { table, replaced, rows } => {
          if let Some(old) = &replaced {
            report.buckets.remove(old);
          }
          buckets.retain(|b| b.begin != table.begin);
          report.rows_archived += rows as u64;
          report.buckets.insert(table.name.clone());
          buckets.push(table);
        }
        WindowOutcome::Empty => {
          // `oldest` came from staging, so its window cannot be empty.
          return Err(Error::CopyIncomplete { table: staging.to_owned(), copied: 0, total: 1 });
        }
        WindowOutcome::Mismatch { table, inserted, deleted_live, deleted_staging } => {
          return Err(Error::Consistency { table, inserted, deleted_live, deleted_staging });
        }
      }
    }
    Ok(())
  }

  // ── Steps ─────────────────────────────────────────────────────────────────

  async fn has_rows_before(&self, live: &str, cutoff: NaiveDateTime) -> Result<bool> {
    let live = live.to_owned();
    let cutoff = format_data_time(cutoff);
    let found = self
      .store()
      .conn()
      .call(move |conn| {
        if !ddl::table_exists(conn, &live)? {
          return Ok(false);
        }
        let hit: Option<i64> = conn
          .query_row(
            &format!("SELECT 1 FROM {} WHERE data_time < ?1 LIMIT 1", quote(&live)),
            [&cutoff],
            |r| r.get(0),
          )
          .optional()?;
        Ok(hit.is_some())
      })
      .await?;
    Ok(found)
  }

  pub(crate) async fn create_staging(&self, live: &str, staging: &str) -> Result<()> {
    let (live, staging) = (live.to_owned(), staging.to_owned());
    self
      .store()
      .conn()
      .call(move |conn| {
        ddl::create_like(conn, &live, &staging)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Copy the next batch of rows older than `cutoff` with `id > after_id`
  /// into staging. Returns `None` once no row qualifies.
  pub(crate) async fn stage_batch(
    &self,
    live: &str,
    staging: &str,
    cutoff: NaiveDateTime,
    after_id: i64,
    batch_size: u32,
  ) -> Result<Option<StagedBatch>> {
    let (live, staging) = (live.to_owned(), staging.to_owned());
    let cutoff = format_data_time(cutoff);
    let batch = self
      .store()
      .conn()
      .call(move |conn| {
        let cols = ddl::columns(conn, &live)?;
        ddl::add_missing_columns(conn, &cols, &staging)?;
        let list = ddl::column_list(&cols);

        let rows = conn.execute(
          &format!(
            "INSERT INTO {staging_q} ({list})
             SELECT {list} FROM {live_q}
             WHERE data_time < ?1 AND id > ?2
             ORDER BY id LIMIT ?3",
            staging_q = quote(&staging),
            live_q = quote(&live),
          ),
          rusqlite::params![cutoff, after_id, batch_size],
        )?;
        if rows == 0 {
          return Ok(None);
        }
        let max_id: i64 = conn.query_row(
          &format!("SELECT MAX(id) FROM {}", quote(&staging)),
          [],
          |r| r.get(0),
        )?;
        Ok(Some(StagedBatch { rows, max_id }))
      })
      .await?;
    Ok(batch)
  }

  async fn oldest_staged(&self, staging: &str) -> Result<Option<NaiveDateTime>> {
    let staging = staging.to_owned();
    let oldest: Option<String> = self
      .store()
      .conn()
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("SELECT MIN(data_time) FROM {}", quote(&staging)),
          [],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(oldest.as_deref().map(parse_data_time).transpose()?)
  }

  /// Archive the staged rows of `window` into its bucket in one transaction.
  ///
  /// Appends into `existing` (renaming it when the covered range grows) or
  /// creates a new bucket shaped like live. Staging picks the rows; their
  /// current contents are read from live. Any mismatch between rows
  /// inserted and rows deleted rolls the whole transaction back, including
  /// the bucket DDL.
  async fn archive_window(
    &self,
    live: &str,
    staging: &str,
    window: Window,
    existing: Option<ArchiveTable>,
  ) -> Result<WindowOutcome> {
    let (live, staging) = (live.to_owned(), staging.to_owned());
    let begin = format_data_time(window.begin_time());
    let end = format_data_time(window.end_time());

    let outcome = self
      .store()
      .conn()
      .call(move |conn| {
        let tx = conn.transaction()?;
        let in_window = "data_time >= ?1 AND data_time < ?2";

        let newest: Option<String> = tx.query_row(
          &format!("SELECT MAX(data_time) FROM {} WHERE {in_window}", quote(&staging)),
          [&begin, &end],
          |r| r.get(0),
        )?;
        let Some(newest) = newest else {
          return Ok(WindowOutcome::Empty);
        };
        let covered_end = covered_end(window, &newest);

        let live_cols = ddl::columns(&tx, &live)?;
        let (target, replaced) = match &existing {
          Some(bucket) => {
            let end = covered_end.max(bucket.end);
            let target = bucket_table(&live, bucket.begin, end);
            let replaced = if target != bucket.name {
              ddl::rename(&tx, &bucket.name, &target)?;
              Some(bucket.name.clone())
            } else {
              None
            };
            ddl::add_missing_columns(&tx, &live_cols, &target)?;
            (target, replaced)
          }
          None => {
            let target = bucket_table(&live, window.begin, covered_end);
            ddl::create_like(&tx, &live, &target)?;
            (target, None)
          }
        };

        // Staging selects the ids; row contents are read from live.
        let list = ddl::column_list(&live_cols);
        let inserted = tx.execute(
          &format!(
            "INSERT INTO {} ({list}) SELECT {list} FROM {} \
             WHERE id IN (SELECT id FROM {} WHERE {in_window})",
            quote(&target),
            quote(&live),
            quote(&staging)
          ),
          [&begin, &end],
        )?;
        let deleted_live = tx.execute(
          &format!(
            "DELETE FROM {} WHERE id IN (SELECT id FROM {} WHERE {in_window})",
            quote(&live),
            quote(&staging)
          ),
          [&begin, &end],
        )?;
        let deleted_staging = tx.execute(
          &format!("DELETE FROM {} WHERE {in_window}", quote(&staging)),
          [&begin, &end],
        )?;

        if deleted_live != inserted || deleted_staging != inserted {
          // Dropping `tx` rolls back.
          return Ok(WindowOutcome::Mismatch {
            table: target,
            inserted,
            deleted_live,
            deleted_staging,
          });
        }
        tx.commit()?;

        let table = ArchiveTable::parse(&live, &target)
          .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
        Ok(WindowOutcome::Archived { table, replaced, rows: inserted })
      })
      .await?;

    if let WindowOutcome::Archived { table, replaced, rows } = &outcome {
      debug!(bucket = %table.name, ?replaced, rows, "window archived");
    }
    Ok(outcome)
  }

  pub(crate) async fn drop_table(&self, name: &str) -> Result<()> {
    let name = name.to_owned();
    self
      .store()
      .conn()
      .call(move |conn| {
        ddl::drop_table(conn, &name)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Exclusive end date of the data a bucket covers after archiving rows up to
/// `newest`: the day after the newest row, capped at the window end.
fn covered_end(window: Window, newest: &str) -> chrono::NaiveDate {
  parse_data_time(newest)
    .ok()
    .and_then(|t| t.date().checked_add_days(Days::new(1)))
    .map_or(window.end, |d| d.min(window.end))
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  #[test]
  fn covered_end_is_capped_by_window() {
    let w = Window {
      begin: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      end:   NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    };
    assert_eq!(covered_end(w, "2024-01-15 10:00:00"), NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    assert_eq!(covered_end(w, "2024-01-31 23:59:59"), w.end);
  }
}
