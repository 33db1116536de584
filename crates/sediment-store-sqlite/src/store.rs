//! [`SqliteStore`]: connection handling and live-table ingestion.

use std::{path::Path, time::Duration};

use rusqlite::{OptionalExtension as _, types::Value};
use sediment_core::{
  ColumnValue, DataKind, Reading, SiteId,
  naming::live_table,
  reading::{format_data_time, validate_column},
};

use crate::{
  Result,
  ddl::{self, quote},
  schema::{PRAGMAS, live_table_ddl},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A handle on the shared telemetry database.
///
/// Cheap to clone; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) the database at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init().await?;
    Ok(store)
  }

  /// Open an in-memory database, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init().await?;
    Ok(store)
  }

  async fn init(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub(crate) fn conn(&self) -> &tokio_rusqlite::Connection { &self.conn }

  // ── Catalog queries ───────────────────────────────────────────────────────

  pub async fn table_exists(&self, name: &str) -> Result<bool> {
    let name = name.to_owned();
    Ok(self.conn.call(move |conn| Ok(ddl::table_exists(conn, &name)?)).await?)
  }

  pub async fn tables_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let prefix = prefix.to_owned();
    Ok(self.conn.call(move |conn| Ok(ddl::tables_with_prefix(conn, &prefix)?)).await?)
  }

  pub async fn count_rows(&self, table: &str) -> Result<i64> {
    let table = table.to_owned();
    Ok(self.conn.call(move |conn| Ok(ddl::count_rows(conn, &table)?)).await?)
  }

  /// Column names of `table`, in table order.
  pub async fn column_names(&self, table: &str) -> Result<Vec<String>> {
    let table = table.to_owned();
    let cols = self.conn.call(move |conn| Ok(ddl::columns(conn, &table)?)).await?;
    Ok(cols.into_iter().map(|c| c.name).collect())
  }

  // ── Ingestion ─────────────────────────────────────────────────────────────

  /// Create the live table for `(site, kind)` if missing. Returns its name.
  pub async fn ensure_live_table(&self, site: &SiteId, kind: DataKind) -> Result<String> {
    let live = live_table(site, kind);
    let ddl = live_table_ddl(&live);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(live)
  }

  /// Append a reading to the live table, adding any missing measurement
  /// columns first. Returns the new row id.
  pub async fn insert_row(&self, site: &SiteId, kind: DataKind, reading: Reading) -> Result<i64> {
    let prepared = PreparedReading::new(site, kind, reading)?;
    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        prepared.ensure_shape(&tx)?;
        let id = prepared.insert(&tx)?;
        tx.commit()?;
        Ok(id)
      })
      .await?;
    Ok(id)
  }

  /// Update the row with the same `data_time` and `device`, or insert it.
  /// Returns the id of the written row.
  pub async fn upsert_row(&self, site: &SiteId, kind: DataKind, reading: Reading) -> Result<i64> {
    let prepared = PreparedReading::new(site, kind, reading)?;
    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        prepared.ensure_shape(&tx)?;
        let id = match prepared.find(&tx)? {
          Some(id) => {
            prepared.update(&tx, id)?;
            id
          }
          None => prepared.insert(&tx)?,
        };
        tx.commit()?;
        Ok(id)
      })
      .await?;
    Ok(id)
  }
}

// ─── Reading → SQL ───────────────────────────────────────────────────────────

/// A validated reading bound to its live table, ready to move onto the
/// database thread.
struct PreparedReading {
  live:      String,
  data_time: String,
  device:    String,
  values:    Vec<(String, ColumnValue)>,
}

impl PreparedReading {
  fn new(site: &SiteId, kind: DataKind, reading: Reading) -> Result<Self> {
    for name in reading.values.keys() {
      validate_column(name)?;
    }
    Ok(Self {
      live:      live_table(site, kind),
      data_time: format_data_time(reading.data_time),
      device:    reading.device,
      values:    reading.values.into_iter().collect(),
    })
  }

  fn ensure_shape(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&live_table_ddl(&self.live))?;
    let existing = ddl::columns(conn, &self.live)?;
    for (name, value) in &self.values {
      if existing.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
        continue;
      }
      let decl = match value {
        ColumnValue::Number(_) => "REAL",
        ColumnValue::Text(_) => "TEXT NOT NULL DEFAULT ''",
      };
      conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {decl}", quote(&self.live), quote(name)),
        [],
      )?;
    }
    Ok(())
  }

  fn bound_values(&self) -> impl Iterator<Item = Value> + '_ {
    self.values.iter().map(|(_, v)| match v {
      ColumnValue::Number(n) => Value::Real(*n),
      ColumnValue::Text(t) => Value::Text(t.clone()),
    })
  }

  fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    let mut names = vec![quote("data_time"), quote("device")];
    names.extend(self.values.iter().map(|(n, _)| quote(n)));
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
      "INSERT INTO {} ({}) VALUES ({})",
      quote(&self.live),
      names.join(", "),
      placeholders.join(", ")
    );

    let params = [Value::Text(self.data_time.clone()), Value::Text(self.device.clone())]
      .into_iter()
      .chain(self.bound_values());
    conn.execute(&sql, rusqlite::params_from_iter(params))?;
    Ok(conn.last_insert_rowid())
  }

  fn find(&self, conn: &rusqlite::Connection) -> rusqlite::Result<Option<i64>> {
    conn
      .query_row(
        &format!(
          "SELECT id FROM {} WHERE data_time = ?1 AND device = ?2 ORDER BY id LIMIT 1",
          quote(&self.live)
        ),
        [&self.data_time, &self.device],
        |r| r.get(0),
      )
      .optional()
  }

  fn update(&self, conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<()> {
    if self.values.is_empty() {
      return Ok(());
    }
    let sets: Vec<String> = self
      .values
      .iter()
      .enumerate()
      .map(|(i, (n, _))| format!("{} = ?{}", quote(n), i + 1))
      .collect();
    let sql = format!(
      "UPDATE {} SET {} WHERE id = ?{}",
      quote(&self.live),
      sets.join(", "),
      self.values.len() + 1
    );
    let params = self.bound_values().chain(std::iter::once(Value::Integer(id)));
    conn.execute(&sql, rusqlite::params_from_iter(params))?;
    Ok(())
  }
}
