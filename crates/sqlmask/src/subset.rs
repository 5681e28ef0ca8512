//! Graph-closed subset solver.
//!
//! From the configured roots, computes a per-table set of primary-key tuples
//! that is transitively closed under both directions of every foreign-key
//! edge, so the emitted database passes foreign-key validation. The
//! expansion is a fixed-point iteration: only insertions occur and the row
//! universe is finite, so it terminates.

use std::collections::{BTreeMap, HashSet};

use rusqlite::{params_from_iter, Connection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::core::identifier::quote_ident;
use crate::core::schema::{FkGroup, Schema, Table};
use crate::core::value::{tuple_key, Value};
use crate::error::{MaskError, Result};

/// Tuples per WHERE-IN chunk; bounds the bound-parameter count well under
/// SQLite's limit.
pub(crate) const CHUNK_SIZE: usize = 500;

/// Ordered, de-duplicated collection of primary-key tuples for one table.
#[derive(Debug, Clone)]
pub struct PkSet {
    /// The key columns of the stored tuples (the table's effective PK).
    pub cols: Vec<String>,
    keys: HashSet<String>,
    rows: Vec<Vec<Value>>,
}

impl PkSet {
    /// Create an empty set keyed by the given columns.
    #[must_use]
    pub fn new(cols: Vec<String>) -> Self {
        Self {
            cols,
            keys: HashSet::new(),
            rows: Vec::new(),
        }
    }

    /// Insert a tuple, preserving insertion order. Returns false when the
    /// tuple was already present (dedup by textual key).
    pub fn insert(&mut self, values: Vec<Value>) -> bool {
        let key = tuple_key(&values);
        if !self.keys.insert(key) {
            return false;
        }
        self.rows.push(values);
        true
    }

    /// Number of tuples admitted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The admitted tuples in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Project the stored tuples onto the requested columns.
    pub fn values_by_columns(&self, cols: &[String]) -> Result<Vec<Vec<Value>>> {
        if cols.is_empty() {
            return Err(MaskError::Config("no columns requested".to_string()));
        }
        if cols == self.cols.as_slice() {
            return Ok(self.rows.clone());
        }
        let mut indices = Vec::with_capacity(cols.len());
        for col in cols {
            let pos = self.cols.iter().position(|c| c == col).ok_or_else(|| {
                MaskError::Config(format!("missing column {col} in key set"))
            })?;
            indices.push(pos);
        }
        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|i| row[*i].clone()).collect())
            .collect())
    }
}

/// Per-table admitted key tuples. Tables absent from the map are either
/// excluded or unreachable from every root.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Table name → admitted tuples.
    pub sets: BTreeMap<String, PkSet>,
}

impl Selection {
    /// The set for a table, if it was populated.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<&PkSet> {
        self.sets.get(table)
    }
}

/// Populate the selection from the configured roots, then expand it to a
/// foreign-key-closed fixed point.
pub fn build_selection(
    conn: &Connection,
    schema: &Schema,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Selection> {
    let mut selection = Selection::default();
    let Some(subset) = &config.subset else {
        return Ok(selection);
    };
    if subset.roots.is_empty() {
        return Ok(selection);
    }

    for root in &subset.roots {
        if root.table.is_empty() {
            continue;
        }
        let table = schema.tables.get(&root.table).ok_or_else(|| {
            MaskError::Config(format!("subset root table not found: {}", root.table))
        })?;
        populate_root(conn, table, root.where_clause.as_deref(), root.limit, &mut selection)?;
    }

    expand_selection(conn, schema, &mut selection, cancel)?;
    Ok(selection)
}

fn populate_root(
    conn: &Connection,
    table: &Table,
    where_clause: Option<&str>,
    limit: Option<u32>,
    selection: &mut Selection,
) -> Result<()> {
    let (pk_cols, use_rowid) = table.effective_pk()?;
    let cols_sql = key_cols_sql(&pk_cols, use_rowid).join(", ");
    let mut query = format!("SELECT {} FROM {}", cols_sql, quote_ident(&table.name));
    if let Some(clause) = where_clause {
        if !clause.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(clause);
        }
    }
    query.push_str(" ORDER BY ");
    query.push_str(&cols_sql);
    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {limit}"));
    }

    let set = selection
        .sets
        .entry(table.name.clone())
        .or_insert_with(|| PkSet::new(pk_cols.clone()));

    let mut stmt = conn
        .prepare(&query)
        .map_err(|e| MaskError::subset(&table.name, format!("root query: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| MaskError::subset(&table.name, format!("root query: {e}")))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| MaskError::subset(&table.name, format!("root scan: {e}")))?
    {
        let tuple = read_tuple(row, pk_cols.len())?;
        set.insert(tuple);
    }
    debug!(table = %table.name, keys = set.len(), "subset root populated");
    Ok(())
}

fn expand_selection(
    conn: &Connection,
    schema: &Schema,
    selection: &mut Selection,
    cancel: &CancellationToken,
) -> Result<()> {
    let table_names: Vec<String> = schema.tables.keys().cloned().collect();
    let fk_groups: BTreeMap<&str, Vec<FkGroup>> = schema
        .tables
        .iter()
        .map(|(name, table)| (name.as_str(), table.fk_groups()))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for child_name in &table_names {
            if cancel.is_cancelled() {
                return Err(MaskError::Cancelled);
            }
            let child = &schema.tables[child_name];
            for fk in &fk_groups[child_name.as_str()] {
                let Some(parent) = schema.tables.get(&fk.ref_table) else {
                    continue;
                };

                let child_populated = selection
                    .get(child_name)
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                if child_populated {
                    let ref_vals = select_fk_values(conn, child, fk, selection)?;
                    if !ref_vals.is_empty() && add_parent_keys(conn, parent, fk, &ref_vals, selection)? {
                        changed = true;
                    }
                }

                let parent_populated = selection
                    .get(&fk.ref_table)
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                if parent_populated && add_child_keys(conn, child, fk, selection)? {
                    changed = true;
                }
            }
        }
    }
    Ok(())
}

/// Distinct non-null `from_cols` values of the already-selected child rows.
fn select_fk_values(
    conn: &Connection,
    child: &Table,
    fk: &FkGroup,
    selection: &Selection,
) -> Result<Vec<Vec<Value>>> {
    let (pk_cols, use_rowid) = child.effective_pk()?;
    let Some(child_set) = selection.get(&child.name) else {
        return Ok(Vec::new());
    };
    let child_keys = child_set.values_by_columns(&pk_cols)?;
    if child_keys.is_empty() {
        return Ok(Vec::new());
    }

    let from_sql = key_cols_sql(&fk.from_cols, false).join(", ");
    let mut results = Vec::new();
    for chunk in child_keys.chunks(CHUNK_SIZE) {
        let (where_in, params) = build_tuple_in(&pk_cols, chunk, use_rowid);
        let query = format!(
            "SELECT DISTINCT {} FROM {} WHERE {}{}",
            from_sql,
            quote_ident(&child.name),
            where_in,
            not_null_clause(&fk.from_cols)
        );
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| MaskError::subset(&child.name, format!("select fk values: {e}")))?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| MaskError::subset(&child.name, format!("select fk values: {e}")))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| MaskError::subset(&child.name, format!("scan fk values: {e}")))?
        {
            results.push(read_tuple(row, fk.from_cols.len())?);
        }
    }
    Ok(results)
}

/// Ensure the parent rows referenced by `ref_vals` are selected.
fn add_parent_keys(
    conn: &Connection,
    parent: &Table,
    fk: &FkGroup,
    ref_vals: &[Vec<Value>],
    selection: &mut Selection,
) -> Result<bool> {
    let (pk_cols, use_rowid) = parent.effective_pk()?;
    let parent_set = selection
        .sets
        .entry(parent.name.clone())
        .or_insert_with(|| PkSet::new(pk_cols.clone()));

    // When the FK targets the parent's PK directly, the referenced values
    // are the key tuples themselves.
    if parent_set.cols == fk.to_cols {
        let mut added = false;
        for row in ref_vals {
            if parent_set.insert(row.clone()) {
                added = true;
            }
        }
        return Ok(added);
    }

    let pk_sql = key_cols_sql(&pk_cols, use_rowid).join(", ");
    let mut added = false;
    for chunk in ref_vals.chunks(CHUNK_SIZE) {
        let (where_in, params) = build_tuple_in(&fk.to_cols, chunk, false);
        let query = format!(
            "SELECT {} FROM {} WHERE {}",
            pk_sql,
            quote_ident(&parent.name),
            where_in
        );
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| MaskError::subset(&parent.name, format!("select parent keys: {e}")))?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| MaskError::subset(&parent.name, format!("select parent keys: {e}")))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| MaskError::subset(&parent.name, format!("scan parent keys: {e}")))?
        {
            let tuple = read_tuple(row, pk_cols.len())?;
            if let Some(set) = selection.sets.get_mut(&parent.name) {
                if set.insert(tuple) {
                    added = true;
                }
            }
        }
    }
    Ok(added)
}

/// Select every child row whose `from_cols` hit a selected parent key.
fn add_child_keys(
    conn: &Connection,
    child: &Table,
    fk: &FkGroup,
    selection: &mut Selection,
) -> Result<bool> {
    let (pk_cols, use_rowid) = child.effective_pk()?;
    let Some(parent_set) = selection.get(&fk.ref_table) else {
        return Ok(false);
    };
    let parent_vals = parent_set.values_by_columns(&fk.to_cols)?;
    if parent_vals.is_empty() {
        return Ok(false);
    }

    selection
        .sets
        .entry(child.name.clone())
        .or_insert_with(|| PkSet::new(pk_cols.clone()));

    let pk_sql = key_cols_sql(&pk_cols, use_rowid).join(", ");
    let mut added = false;
    for chunk in parent_vals.chunks(CHUNK_SIZE) {
        let (where_in, params) = build_tuple_in(&fk.from_cols, chunk, false);
        let query = format!(
            "SELECT DISTINCT {} FROM {} WHERE {}",
            pk_sql,
            quote_ident(&child.name),
            where_in
        );
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| MaskError::subset(&child.name, format!("select child keys: {e}")))?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| MaskError::subset(&child.name, format!("select child keys: {e}")))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| MaskError::subset(&child.name, format!("scan child keys: {e}")))?
        {
            let tuple = read_tuple(row, pk_cols.len())?;
            if let Some(set) = selection.sets.get_mut(&child.name) {
                if set.insert(tuple) {
                    added = true;
                }
            }
        }
    }
    Ok(added)
}

/// Read the first `n` columns of a row as a value tuple.
pub(crate) fn read_tuple(row: &rusqlite::Row<'_>, n: usize) -> Result<Vec<Value>> {
    let mut tuple = Vec::with_capacity(n);
    for i in 0..n {
        tuple.push(Value::from(row.get_ref(i)?));
    }
    Ok(tuple)
}

/// Quote key columns for SQL, leaving the implicit `rowid` bare.
pub(crate) fn key_cols_sql(cols: &[String], use_rowid: bool) -> Vec<String> {
    cols.iter()
        .map(|c| {
            if use_rowid && c == "rowid" {
                c.clone()
            } else {
                quote_ident(c)
            }
        })
        .collect()
}

/// Build a WHERE-IN fragment over a chunk of tuples, returning the SQL text
/// and the flattened parameter list.
///
/// Single column: `c IN (?, ?, …)`. Multiple columns:
/// `(a, b) IN ((?, ?), (?, ?), …)`.
pub(crate) fn build_tuple_in<'a>(
    cols: &[String],
    values: &'a [Vec<Value>],
    use_rowid: bool,
) -> (String, Vec<&'a Value>) {
    if cols.len() == 1 {
        let col = key_cols_sql(cols, use_rowid).remove(0);
        let placeholders = vec!["?"; values.len()].join(", ");
        let params = values.iter().map(|row| &row[0]).collect();
        return (format!("{col} IN ({placeholders})"), params);
    }

    let tuple_placeholder = format!("({})", vec!["?"; cols.len()].join(", "));
    let placeholders = vec![tuple_placeholder.as_str(); values.len()].join(", ");
    let params = values
        .iter()
        .flat_map(|row| row.iter().take(cols.len()))
        .collect();
    (
        format!(
            "({}) IN ({})",
            key_cols_sql(cols, use_rowid).join(", "),
            placeholders
        ),
        params,
    )
}

fn not_null_clause(cols: &[String]) -> String {
    let clauses: Vec<String> = cols
        .iter()
        .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
        .collect();
    format!(" AND {}", clauses.join(" AND "))
}
