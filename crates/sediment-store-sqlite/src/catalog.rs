//! Table Catalog: which archive tables exist for a site/kind, and in which
//! status.
//!
//! The database catalog is authoritative; the in-memory map is an advisory
//! cache that is always safe to drop. Its lock is only held for map access,
//! never across a database call.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use sediment_core::{ArchiveTable, DataKind, SiteId, naming::live_table};
use tracing::debug;

use crate::{Result, SqliteStore};

type Key = (SiteId, DataKind);

/// A catalog listing, ordered by bucket begin date then name.
#[derive(Debug, Clone)]
pub struct Listing {
  pub tables:     Arc<[ArchiveTable]>,
  /// `false` when the listing was just derived from the database.
  pub from_cache: bool,
}

pub struct Catalog {
  store:   SqliteStore,
  caching: bool,
  cache:   RwLock<HashMap<Key, Arc<[ArchiveTable]>>>,
}

impl Catalog {
  /// A caching catalog, for the worker process that performs all renames.
  pub fn new(store: SqliteStore) -> Self {
    Self { store, caching: true, cache: RwLock::new(HashMap::new()) }
  }

  /// A catalog that re-derives every listing, for processes that cannot
  /// observe the worker's renames.
  pub fn pass_through(store: SqliteStore) -> Self {
    Self { store, caching: false, cache: RwLock::new(HashMap::new()) }
  }

  pub fn store(&self) -> &SqliteStore { &self.store }

  pub async fn list(&self, site: &SiteId, kind: DataKind) -> Result<Listing> {
    let key = (site.clone(), kind);
    if self.caching {
      let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
      if let Some(tables) = cache.get(&key) {
        return Ok(Listing { tables: tables.clone(), from_cache: true });
      }
    }

    let live = live_table(site, kind);
    let names = self.store.tables_with_prefix(&format!("{live}_")).await?;
    let tables: Arc<[ArchiveTable]> = parse_listing(&live, &names).into();

    if self.caching {
      self
        .cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, tables.clone());
    }
    Ok(Listing { tables, from_cache: false })
  }

  pub fn invalidate(&self, site: &SiteId, kind: DataKind) {
    self
      .cache
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&(site.clone(), kind));
  }

  pub fn invalidate_all(&self) {
    self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
  }
}

/// Parse table names into archive tables. Names that are not archive tables
/// of `live` (staging, promotion targets, foreign tables) are skipped.
pub fn parse_listing(live: &str, names: &[String]) -> Vec<ArchiveTable> {
  let mut tables: Vec<ArchiveTable> = names
    .iter()
    .filter_map(|name| match ArchiveTable::parse(live, name) {
      Ok(t) => Some(t),
      Err(e) => {
        debug!(table = %name, error = %e, "skipping non-archive table");
        None
      }
    })
    .collect();
  tables.sort_by(|a, b| a.begin.cmp(&b.begin).then_with(|| a.name.cmp(&b.name)));
  tables
}

#[cfg(test)]
mod tests {
  use sediment_core::TableStatus;

  use super::*;

  #[test]
  fn listing_skips_and_sorts() {
    let names: Vec<String> = [
      "s1_hourdata_rotating",
      "s1_hourdata_20240201_20240301",
      "s1_hourdata_20240101_20240201_activated",
      "s1_hourdata_20240101_20240201_active",
      "s1_hourdata_20240101_20240201_promoting",
      "s1_hourdata_junk",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    let tables = parse_listing("s1_hourdata", &names);
    let statuses: Vec<TableStatus> = tables.iter().map(|t| t.status).collect();
    assert_eq!(
      statuses,
      vec![TableStatus::Activated, TableStatus::Active, TableStatus::Archived]
    );
    assert_eq!(tables[2].name, "s1_hourdata_20240201_20240301");
  }
}
