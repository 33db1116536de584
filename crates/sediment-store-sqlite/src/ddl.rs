//! Synchronous schema helpers run inside `tokio_rusqlite` closures.
//!
//! SQLite has no `CREATE TABLE ... LIKE`; copies are rebuilt from
//! `PRAGMA table_info` so column order, declared types and defaults survive.
//! All helpers take `&Connection` so they also work on a `Transaction`.

use rusqlite::Connection;

/// Quote an identifier for interpolation into SQL.
pub fn quote(ident: &str) -> String { format!("\"{}\"", ident.replace('"', "\"\"")) }

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
  pub name:      String,
  pub decl_type: String,
  pub not_null:  bool,
  pub default:   Option<String>,
  /// 1-based position in the primary key, 0 when not part of it.
  pub pk:        i64,
}

impl Column {
  /// Numeric column affinity, following SQLite's affinity rules.
  pub fn is_numeric(&self) -> bool {
    let t = self.decl_type.to_ascii_uppercase();
    if t.contains("INT") {
      return true;
    }
    if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
      return false;
    }
    if t.is_empty() || t.contains("BLOB") {
      return false;
    }
    true
  }

  /// Literal used when a copy source lacks this column.
  pub fn fill_literal(&self) -> &'static str { if self.is_numeric() { "0" } else { "''" } }

  fn definition(&self, inline_pk: bool) -> String {
    let mut def = quote(&self.name);
    if !self.decl_type.is_empty() {
      def.push(' ');
      def.push_str(&self.decl_type);
    }
    if inline_pk {
      def.push_str(" PRIMARY KEY");
    }
    if self.not_null {
      def.push_str(" NOT NULL");
    }
    if let Some(d) = &self.default {
      def.push_str(" DEFAULT ");
      def.push_str(d);
    }
    def
  }

  /// `ALTER TABLE ADD COLUMN` cannot add a primary key, nor a `NOT NULL`
  /// column without a default.
  fn added_definition(&self) -> String {
    let mut col = self.clone();
    col.not_null = self.not_null && self.default.is_some();
    col.definition(false)
  }

  fn same_name(&self, other: &str) -> bool { self.name.eq_ignore_ascii_case(other) }
}

pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
    [name],
    |r| r.get(0),
  )
}

/// Names of all tables starting with `prefix`, sorted.
pub fn tables_with_prefix(conn: &Connection, prefix: &str) -> rusqlite::Result<Vec<String>> {
  // `LIKE` treats `_` as a wildcard, so compare the prefix literally.
  let mut stmt = conn.prepare(
    "SELECT name FROM sqlite_master
     WHERE type = 'table' AND substr(name, 1, length(?1)) = ?1
     ORDER BY name",
  )?;
  stmt
    .query_map([prefix], |r| r.get(0))?
    .collect()
}

pub fn columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<Column>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
  stmt
    .query_map([], |r| {
      Ok(Column {
        name:      r.get(1)?,
        decl_type: r.get(2)?,
        not_null:  r.get::<_, i64>(3)? != 0,
        default:   r.get(4)?,
        pk:        r.get(5)?,
      })
    })?
    .collect()
}

/// Comma-separated quoted column names.
pub fn column_list(cols: &[Column]) -> String {
  cols.iter().map(|c| quote(&c.name)).collect::<Vec<_>>().join(", ")
}

/// Create `dst` with the column set of `src`. Returns the copied columns.
pub fn create_like(conn: &Connection, src: &str, dst: &str) -> rusqlite::Result<Vec<Column>> {
  let cols = columns(conn, src)?;
  if cols.is_empty() {
    return Err(rusqlite::Error::QueryReturnedNoRows);
  }
  let pk_count = cols.iter().filter(|c| c.pk > 0).count();
  let mut defs: Vec<String> =
    cols.iter().map(|c| c.definition(pk_count == 1 && c.pk > 0)).collect();
  if pk_count > 1 {
    let mut pk: Vec<&Column> = cols.iter().filter(|c| c.pk > 0).collect();
    pk.sort_by_key(|c| c.pk);
    let names: Vec<String> = pk.iter().map(|c| quote(&c.name)).collect();
    defs.push(format!("PRIMARY KEY ({})", names.join(", ")));
  }
  conn.execute(&format!("CREATE TABLE {} ({})", quote(dst), defs.join(", ")), [])?;
  Ok(cols)
}

/// Add to `dst` every column of `wanted` it lacks. Returns how many were added.
pub fn add_missing_columns(
  conn:   &Connection,
  wanted: &[Column],
  dst:    &str,
) -> rusqlite::Result<usize> {
  let existing = columns(conn, dst)?;
  let mut added = 0;
  for col in wanted {
    if existing.iter().any(|e| e.same_name(&col.name)) {
      continue;
    }
    conn.execute(
      &format!("ALTER TABLE {} ADD COLUMN {}", quote(dst), col.added_definition()),
      [],
    )?;
    added += 1;
  }
  Ok(added)
}

/// Projection of `target` columns out of a source having `source` columns.
/// Missing columns are filled with a type-appropriate literal; the names of
/// those are returned alongside the projection.
pub fn column_map(target: &[Column], source: &[Column]) -> (String, Vec<String>) {
  let mut filled = Vec::new();
  let exprs: Vec<String> = target
    .iter()
    .map(|t| {
      if source.iter().any(|s| s.same_name(&t.name)) {
        quote(&t.name)
      } else {
        filled.push(t.name.clone());
        t.fill_literal().to_owned()
      }
    })
    .collect();
  (exprs.join(", "), filled)
}

pub fn rename(conn: &Connection, from: &str, to: &str) -> rusqlite::Result<()> {
  conn.execute(&format!("ALTER TABLE {} RENAME TO {}", quote(from), quote(to)), [])?;
  Ok(())
}

pub fn drop_table(conn: &Connection, name: &str) -> rusqlite::Result<()> {
  conn.execute(&format!("DROP TABLE IF EXISTS {}", quote(name)), [])?;
  Ok(())
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
  conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |r| r.get(0))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn col(name: &str, decl_type: &str) -> Column {
    Column {
      name:      name.into(),
      decl_type: decl_type.into(),
      not_null:  false,
      default:   None,
      pk:        0,
    }
  }

  #[test]
  fn quote_escapes_double_quotes() {
    assert_eq!(quote("s1_hourdata"), "\"s1_hourdata\"");
    assert_eq!(quote("a\"b"), "\"a\"\"b\"");
  }

  #[test]
  fn affinity_drives_fill_literal() {
    assert_eq!(col("a", "REAL").fill_literal(), "0");
    assert_eq!(col("a", "INTEGER").fill_literal(), "0");
    assert_eq!(col("a", "NUMERIC").fill_literal(), "0");
    assert_eq!(col("a", "TEXT").fill_literal(), "''");
    assert_eq!(col("a", "VARCHAR(8)").fill_literal(), "''");
    assert_eq!(col("a", "").fill_literal(), "''");
  }

  #[test]
  fn column_map_fills_missing() {
    let target = [col("id", "INTEGER"), col("pm25", "REAL"), col("flag", "TEXT")];
    let source = [col("id", "INTEGER")];
    let (exprs, filled) = column_map(&target, &source);
    assert_eq!(exprs, "\"id\", 0, ''");
    assert_eq!(filled, vec!["pm25".to_string(), "flag".to_string()]);
  }

  #[test]
  fn create_like_copies_shape() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch(
        "CREATE TABLE src (id INTEGER PRIMARY KEY AUTOINCREMENT, data_time TEXT NOT NULL,
                           flag TEXT NOT NULL DEFAULT '', pm25 REAL);",
      )
      .unwrap();
    create_like(&conn, "src", "dst").unwrap();

    let src = columns(&conn, "src").unwrap();
    let dst = columns(&conn, "dst").unwrap();
    assert_eq!(src, dst);
    assert!(tables_with_prefix(&conn, "ds").unwrap() == vec!["dst".to_string()]);
  }

  #[test]
  fn add_missing_columns_is_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch(
        "CREATE TABLE a (id INTEGER PRIMARY KEY, x REAL, f TEXT NOT NULL DEFAULT '');
         CREATE TABLE b (id INTEGER PRIMARY KEY);",
      )
      .unwrap();
    let wanted = columns(&conn, "a").unwrap();
    assert_eq!(add_missing_columns(&conn, &wanted, "b").unwrap(), 2);
    assert_eq!(add_missing_columns(&conn, &wanted, "b").unwrap(), 0);
    assert_eq!(columns(&conn, "b").unwrap().len(), 3);
  }

  #[test]
  fn prefix_match_is_literal() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch("CREATE TABLE s1_hourdata (id INTEGER); CREATE TABLE s1xhourdata (id INTEGER);")
      .unwrap();
    assert_eq!(tables_with_prefix(&conn, "s1_").unwrap(), vec!["s1_hourdata".to_string()]);
  }
}
