//! Masking configuration: YAML loading and table filtering.

mod types;

pub use types::{ColumnRule, Config, RootConfig, SubsetConfig, TableRules};

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{MaskError, Result};

impl Config {
    /// Load a configuration from a YAML file. A missing path yields the
    /// default (empty) configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Compile the include/exclude patterns into a [`TableFilter`].
    pub fn table_filter(&self) -> Result<TableFilter> {
        TableFilter::new(&self.include_tables, &self.exclude_tables)
    }
}

/// Compiled include/exclude table filter.
///
/// Patterns are shell-style globs (`*`, `?`, `[...]` character classes,
/// backslash escapes); `{a,b}` alternation is additionally accepted. A table
/// is included iff the include list is empty or matches it, and no exclude
/// pattern matches it.
#[derive(Debug)]
pub struct TableFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl TableFilter {
    /// Compile the given patterns, failing on any invalid glob.
    pub fn new(include: &[String], exclude: &[String]) -> Result<TableFilter> {
        let include = if include.is_empty() {
            None
        } else {
            Some(compile_globs(include)?)
        };
        Ok(TableFilter {
            include,
            exclude: compile_globs(exclude)?,
        })
    }

    /// Whether a table passes the filter.
    #[must_use]
    pub fn is_included(&self, name: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(name) {
                return false;
            }
        }
        !self.exclude.is_match(name)
    }
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| MaskError::Config(format!("invalid table pattern {pattern:?}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| MaskError::Config(format!("invalid table patterns: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
include_tables: ["users", "order*"]
exclude_tables: ["*_audit"]
tables:
  users:
    columns:
      email:
        type: HmacSha256
        maxlen: 16
      birthday:
        type: DateShift
        params:
          max_days: 60
      country:
        type: MapReplace
        map:
          US: XX
subset:
  roots:
    - table: users
      where: "country = 'US'"
      limit: 10
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.include_tables, vec!["users", "order*"]);
        let users = &cfg.tables["users"];
        assert_eq!(users.columns["email"].kind, "HmacSha256");
        assert_eq!(users.columns["email"].maxlen, 16);
        assert_eq!(
            users.columns["birthday"].params["max_days"],
            serde_yaml::Value::from(60)
        );
        assert_eq!(users.columns["country"].map["US"], "XX");
        let subset = cfg.subset.as_ref().unwrap();
        assert_eq!(subset.roots.len(), 1);
        assert_eq!(subset.roots[0].table, "users");
        assert_eq!(subset.roots[0].where_clause.as_deref(), Some("country = 'US'"));
        assert_eq!(subset.roots[0].limit, Some(10));
    }

    #[test]
    fn test_empty_config_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert!(cfg.include_tables.is_empty());
        assert!(cfg.tables.is_empty());
        assert!(cfg.subset.is_none());
    }

    #[test]
    fn test_filter_include_exclude() {
        let filter = TableFilter::new(
            &["user*".to_string()],
            &["users_audit".to_string()],
        )
        .unwrap();
        assert!(filter.is_included("users"));
        assert!(filter.is_included("user_roles"));
        assert!(!filter.is_included("orders"));
        assert!(!filter.is_included("users_audit"));
    }

    #[test]
    fn test_filter_empty_include_matches_all() {
        let filter = TableFilter::new(&[], &["tmp_?".to_string()]).unwrap();
        assert!(filter.is_included("anything"));
        assert!(!filter.is_included("tmp_1"));
    }

    #[test]
    fn test_filter_character_class() {
        let filter = TableFilter::new(&["log_[0-9]".to_string()], &[]).unwrap();
        assert!(filter.is_included("log_3"));
        assert!(!filter.is_included("log_x"));
    }

    #[test]
    fn test_filter_invalid_pattern_is_config_error() {
        let err = TableFilter::new(&["[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, MaskError::Config(_)));
    }
}
