//! Connection setup and the live-table DDL.

use crate::ddl::quote;

/// Executed once per connection.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
";

/// DDL for a live table; idempotent thanks to `IF NOT EXISTS`.
///
/// `AUTOINCREMENT` keeps row ids from being reused after rotation deletes
/// the oldest rows, so archived ids never collide with new live ids.
/// Measurement columns are added later by ingestion.
pub fn live_table_ddl(live: &str) -> String {
  let table = quote(live);
  let index = quote(&format!("{live}_time_idx"));
  format!(
    "CREATE TABLE IF NOT EXISTS {table} (
         id        INTEGER PRIMARY KEY AUTOINCREMENT,
         data_time TEXT NOT NULL,
         device    TEXT NOT NULL DEFAULT ''
     );
     CREATE INDEX IF NOT EXISTS {index} ON {table} (data_time);"
  )
}
