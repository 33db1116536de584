use chrono::NaiveDateTime;
use sediment_core::{ArchiveControl, DataKind, SiteId, TableStatus, naming::live_table};
use tracing::warn;

use crate::{Catalog, Result};

/// Tables a query over `[begin, end)` must read, live table first.
///
/// Archived buckets are read as they are; for an active bucket the promoted
/// table is returned and its rollback timer is touched through `control`.
/// Buckets mid-activation and the `_activated` originals are skipped; their
/// rows are reachable through the other name.
pub async fn resolve_tables_for_range<A: ArchiveControl>(
  catalog: &Catalog,
  control: &A,
  site: &SiteId,
  kind: DataKind,
  begin: NaiveDateTime,
  end: NaiveDateTime,
) -> Result<Vec<String>> {
  let live = live_table(site, kind);
  let mut tables = Vec::new();
  if catalog.store().table_exists(&live).await? {
    tables.push(live);
  }

  let listing = catalog.list(site, kind).await?;
  for table in listing.tables.iter().filter(|t| t.overlaps(begin, end)) {
    match table.status {
      TableStatus::Archived => tables.push(table.name.clone()),
      TableStatus::Active => {
        if let Err(e) = control
          .trigger_archive_rollback(site.clone(), kind, table.base.clone())
          .await
        {
          warn!(%site, %kind, table = %table.name, error = %e, "failed to touch active archive");
        }
        tables.push(table.name.clone());
      }
      TableStatus::Activating | TableStatus::Activated => {}
    }
  }
  Ok(tables)
}
