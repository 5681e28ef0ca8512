//! Schema metadata types for tables, columns, foreign keys, and the
//! auxiliary SQL objects (views, indexes, triggers) replayed after data.
//!
//! Everything here is loaded once at run start and immutable thereafter.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{MaskError, Result};

/// The introspected schema of an input database.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Tables keyed by name.
    pub tables: BTreeMap<String, Table>,

    /// Views in catalog order.
    pub views: Vec<SqlObject>,

    /// Indexes in catalog order.
    pub indexes: Vec<SqlObject>,

    /// Triggers in catalog order.
    pub triggers: Vec<SqlObject>,
}

/// A named auxiliary object carrying its original CREATE statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlObject {
    /// Object name.
    pub name: String,

    /// Original SQL, replayed verbatim on the output.
    pub sql: String,
}

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Original CREATE TABLE statement, replayed verbatim.
    pub sql: String,

    /// Column definitions in declaration order.
    pub columns: Vec<Column>,

    /// Primary key column names in key-ordinal order.
    pub primary_keys: Vec<String>,

    /// Foreign key edges (one entry per column of each constraint).
    pub foreign_keys: Vec<ForeignKey>,

    /// Whether the table was declared WITHOUT ROWID.
    pub without_rowid: bool,
}

impl Table {
    /// Declared column names in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// The columns that key rows for subsetting and ordering: the declared
    /// primary key, or the implicit `rowid` for rowid tables. The second
    /// element is true when `rowid` is being used.
    ///
    /// A table with no primary key and WITHOUT ROWID has no addressable key
    /// and is a hard error here.
    pub fn effective_pk(&self) -> Result<(Vec<String>, bool)> {
        if !self.primary_keys.is_empty() {
            return Ok((self.primary_keys.clone(), false));
        }
        if self.without_rowid {
            return Err(MaskError::subset(
                &self.name,
                "table has no primary key and is WITHOUT ROWID",
            ));
        }
        Ok((vec!["rowid".to_string()], true))
    }

    /// Foreign keys grouped by constraint id, in constraint-id order.
    /// Multi-column constraints keep `from_cols` and `to_cols` as parallel
    /// ordered lists.
    #[must_use]
    pub fn fk_groups(&self) -> Vec<FkGroup> {
        let mut by_id: BTreeMap<i64, FkGroup> = BTreeMap::new();
        for fk in &self.foreign_keys {
            let group = by_id.entry(fk.id).or_insert_with(|| FkGroup {
                ref_table: fk.ref_table.clone(),
                from_cols: Vec::new(),
                to_cols: Vec::new(),
            });
            group.from_cols.push(fk.from_col.clone());
            group.to_cols.push(fk.to_col.clone());
        }
        by_id.into_values().collect()
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type, kept as an opaque string.
    pub decl_type: String,

    /// Whether the column is NOT NULL.
    pub not_null: bool,

    /// Default expression text, if any.
    pub default_sql: Option<String>,

    /// Whether the column participates in the primary key.
    pub pk: bool,
}

/// One column of a foreign key constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint id; columns of a multi-column constraint share it.
    pub id: i64,

    /// Column position within the constraint.
    pub seq: i64,

    /// Referenced table name.
    pub ref_table: String,

    /// Referencing column in this table.
    pub from_col: String,

    /// Referenced column in the parent table.
    pub to_col: String,

    /// ON UPDATE action, kept opaque.
    pub on_update: String,

    /// ON DELETE action, kept opaque.
    pub on_delete: String,
}

/// A foreign key constraint with its columns collected into parallel lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkGroup {
    /// Referenced (parent) table.
    pub ref_table: String,

    /// Referencing columns in the child table.
    pub from_cols: Vec<String>,

    /// Referenced columns in the parent table.
    pub to_cols: Vec<String>,
}

/// Deterministic topological ordering of tables by FK dependency.
///
/// Kahn's algorithm over parent → child edges, considering only FKs whose
/// referenced table exists in the schema. Ties break lexicographically at
/// every step. Tables caught in cycles (or otherwise unreached) are appended
/// in lexicographic order; cycles are not an error because FK enforcement on
/// the output is configurable.
#[must_use]
pub fn table_order(schema: &Schema) -> Vec<String> {
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    for name in schema.tables.keys() {
        indegree.insert(name, 0);
    }
    for (name, table) in &schema.tables {
        for fk in &table.foreign_keys {
            if !schema.tables.contains_key(&fk.ref_table) {
                continue;
            }
            children
                .entry(fk.ref_table.as_str())
                .or_default()
                .push(name.as_str());
            *indegree.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(schema.tables.len());
    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        if let Some(deps) = children.get(name) {
            for dep in deps {
                if let Some(deg) = indegree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(dep);
                    }
                }
            }
        }
    }

    if order.len() != schema.tables.len() {
        let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let missing: Vec<String> = schema
            .tables
            .keys()
            .filter(|name| !placed.contains(name.as_str()))
            .cloned()
            .collect();
        order.extend(missing);
    }
    order
}
