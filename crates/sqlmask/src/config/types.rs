//! Configuration type definitions.
//!
//! The masking configuration is a passive record: the core consumes it as
//! parsed and resolves transformer rules against the registry before any
//! write happens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Glob patterns for tables to include. Empty means all tables.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Glob patterns for tables to exclude.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Per-table masking rules.
    #[serde(default)]
    pub tables: BTreeMap<String, TableRules>,

    /// Subset roots.
    #[serde(default)]
    pub subset: Option<SubsetConfig>,
}

/// Masking rules for a single table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRules {
    /// Column name → transformer rule.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnRule>,

    /// Reserved for root selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Reserved for root selection.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
}

/// A transformer rule for one column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnRule {
    /// Transformer name, matched case-insensitively against the registry.
    #[serde(rename = "type")]
    pub kind: String,

    /// Transformer-specific parameters. Known key: `max_days`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_yaml::Value>,

    /// Literal for `SetValue`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,

    /// Pattern for `RegexReplace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Replacement for `RegexReplace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,

    /// Reserved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Truncation length for hash/token transforms. Zero means untruncated.
    #[serde(default)]
    pub maxlen: usize,

    /// Inline mapping for `MapReplace`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub map: BTreeMap<String, String>,

    /// Alternate mapping source for `MapReplace`: a table in the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_table: Option<String>,

    /// Key column of `lookup_table`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_key: Option<String>,

    /// Value column of `lookup_table`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_value: Option<String>,
}

/// Subset configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubsetConfig {
    /// Root selections seeding the subset.
    #[serde(default)]
    pub roots: Vec<RootConfig>,
}

/// One root selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootConfig {
    /// Root table name.
    pub table: String,

    /// Optional SQL WHERE fragment.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Optional row limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}
