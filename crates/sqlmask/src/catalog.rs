//! Input/output connection handling and schema introspection.
//!
//! The input database is never parsed as SQL: every definition comes from
//! `sqlite_master` and the table/foreign-key PRAGMAs, and is replayed
//! verbatim on the output.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::core::schema::{Column, ForeignKey, Schema, SqlObject, Table};
use crate::core::identifier::quote_ident;
use crate::error::{MaskError, Result};

/// Busy timeout applied to every connection so concurrent writers back off
/// instead of failing immediately.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open the input database read-only.
pub fn open_input(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Open (and implicitly create) the output database.
///
/// When `temp_dir` is set it is applied as the connection's temporary
/// storage directory.
pub fn open_output(path: &Path, temp_dir: Option<&Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if let Some(dir) = temp_dir {
        conn.pragma_update(None, "temp_store_directory", dir.to_string_lossy().as_ref())?;
    }
    Ok(conn)
}

/// Load the full schema of the input database.
///
/// Reads `sqlite_master` for every non-internal object (names starting with
/// `sqlite_` are skipped), then per-table column metadata and foreign keys.
pub fn load_schema(conn: &Connection) -> Result<Schema> {
    let mut schema = Schema::default();

    let mut stmt = conn
        .prepare("SELECT name, type, sql FROM sqlite_master WHERE name NOT LIKE 'sqlite_%' ORDER BY name")
        .map_err(|e| MaskError::Introspect(format!("sqlite_master: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| MaskError::Introspect(format!("sqlite_master: {e}")))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| MaskError::Introspect(format!("iterate sqlite_master: {e}")))?
    {
        let name: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let sql: Option<String> = row.get(2)?;
        match kind.as_str() {
            "table" => {
                // Tables without stored SQL (e.g. internal shadow tables)
                // cannot be recreated and are skipped.
                let Some(sql) = sql else { continue };
                let without_rowid = sql.to_uppercase().contains("WITHOUT ROWID");
                let (columns, primary_keys) = load_table_info(conn, &name)?;
                let foreign_keys = load_foreign_keys(conn, &name)?;
                debug!(
                    table = %name,
                    columns = columns.len(),
                    foreign_keys = foreign_keys.len(),
                    "introspected table"
                );
                schema.tables.insert(
                    name.clone(),
                    Table {
                        name,
                        sql,
                        columns,
                        primary_keys,
                        foreign_keys,
                        without_rowid,
                    },
                );
            }
            "view" => schema.views.push(SqlObject {
                name,
                sql: sql.unwrap_or_default(),
            }),
            "index" => schema.indexes.push(SqlObject {
                name,
                sql: sql.unwrap_or_default(),
            }),
            "trigger" => schema.triggers.push(SqlObject {
                name,
                sql: sql.unwrap_or_default(),
            }),
            _ => {}
        }
    }

    Ok(schema)
}

fn load_table_info(conn: &Connection, table: &str) -> Result<(Vec<Column>, Vec<String>)> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
        .map_err(|e| MaskError::Introspect(format!("table_info {table}: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| MaskError::Introspect(format!("table_info {table}: {e}")))?;

    let mut columns = Vec::new();
    let mut pk_by_ordinal: std::collections::BTreeMap<i64, String> = std::collections::BTreeMap::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| MaskError::Introspect(format!("iterate table_info {table}: {e}")))?
    {
        let name: String = row.get(1)?;
        let decl_type: String = row.get(2)?;
        let not_null: i64 = row.get(3)?;
        let default_sql: Option<String> = row.get(4)?;
        let pk: i64 = row.get(5)?;
        if pk > 0 {
            pk_by_ordinal.insert(pk, name.clone());
        }
        columns.push(Column {
            name,
            decl_type,
            not_null: not_null == 1,
            default_sql,
            pk: pk > 0,
        });
    }

    let primary_keys = pk_by_ordinal.into_values().collect();
    Ok((columns, primary_keys))
}

fn load_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))
        .map_err(|e| MaskError::Introspect(format!("foreign_key_list {table}: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| MaskError::Introspect(format!("foreign_key_list {table}: {e}")))?;

    let mut fks = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| MaskError::Introspect(format!("iterate foreign_key_list {table}: {e}")))?
    {
        fks.push(ForeignKey {
            id: row.get(0)?,
            seq: row.get(1)?,
            ref_table: row.get(2)?,
            from_col: row.get(3)?,
            to_col: row.get(4)?,
            on_update: row.get(5)?,
            on_delete: row.get(6)?,
        });
    }
    Ok(fks)
}
