//! Schema inspection and draft config generation.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::catalog::load_schema;
use crate::config::{ColumnRule, Config, TableRules};
use crate::core::identifier::quote_ident;
use crate::core::schema::{table_order, Schema, Table};
use crate::error::{MaskError, Result};

/// Per-table inspection result.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,

    /// Row count.
    pub rows: i64,

    /// Columns whose names look like personal data.
    pub pii_candidates: Vec<String>,
}

/// Inspection of a whole database, tables in topological order.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub tables: Vec<TableInfo>,
}

/// Inspect the schema and flag PII-candidate columns.
pub fn inspect(conn: &Connection) -> Result<InspectReport> {
    let schema = load_schema(conn)?;
    let mut tables = Vec::with_capacity(schema.tables.len());
    for name in table_order(&schema) {
        let Some(table) = schema.tables.get(&name) else {
            continue;
        };
        tables.push(TableInfo {
            rows: row_count(conn, &name)?,
            pii_candidates: pii_candidates(table),
            name,
        });
    }
    Ok(InspectReport { tables })
}

fn row_count(conn: &Connection, table: &str) -> Result<i64> {
    let query = format!("SELECT COUNT(1) FROM {}", quote_ident(table));
    conn.query_row(&query, [], |row| row.get(0))
        .map_err(|e| MaskError::Introspect(format!("count {table}: {e}")))
}

fn pii_candidates(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| {
            let name = c.name.to_lowercase();
            ["email", "name", "phone", "ssn", "address", "street"]
                .iter()
                .any(|needle| name.contains(needle))
        })
        .map(|c| c.name.clone())
        .collect()
}

/// Build a draft masking config from column-name heuristics. Tables with no
/// suggested rule are left out entirely.
#[must_use]
pub fn draft_config(schema: &Schema) -> Config {
    let mut tables = BTreeMap::new();
    for (name, table) in &schema.tables {
        let mut columns = BTreeMap::new();
        for column in &table.columns {
            if let Some(rule) = suggest_rule(&column.name) {
                columns.insert(column.name.clone(), rule);
            }
        }
        if !columns.is_empty() {
            tables.insert(
                name.clone(),
                TableRules {
                    columns,
                    ..TableRules::default()
                },
            );
        }
    }
    Config {
        tables,
        ..Config::default()
    }
}

fn suggest_rule(column: &str) -> Option<ColumnRule> {
    let n = column.to_lowercase();
    let rule = |kind: &str| ColumnRule {
        kind: kind.to_string(),
        ..ColumnRule::default()
    };

    if n.contains("email") {
        let mut r = rule("HmacSha256");
        r.maxlen = 24;
        return Some(r);
    }
    if n.contains("name") {
        return Some(rule("FakerName"));
    }
    if n.contains("phone") {
        return Some(rule("FakerPhone"));
    }
    if n.contains("ssn") {
        return Some(rule("SetNull"));
    }
    if n.contains("password") || n.contains("passwd") || n.contains("pwd") {
        let mut r = rule("SetValue");
        r.value = Some(serde_yaml::Value::from("redacted"));
        return Some(r);
    }
    if n.contains("birth") || n.contains("dob") {
        let mut r = rule("DateShift");
        r.params
            .insert("max_days".to_string(), serde_yaml::Value::from(60));
        return Some(r);
    }
    if n.contains("date") || n.contains("timestamp") || n.ends_with("_at") || n.contains("createdat")
        || n.contains("updatedat") || n.contains("modifiedat")
    {
        let mut r = rule("DateShift");
        r.params
            .insert("max_days".to_string(), serde_yaml::Value::from(30));
        return Some(r);
    }
    if n.contains("address") || n.contains("street") {
        return Some(rule("FakerAddress"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_counts_and_candidates() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, full_name TEXT, balance REAL);
             INSERT INTO users (email, full_name) VALUES ('a@x.test', 'A'), ('b@x.test', 'B');",
        )
        .unwrap();
        let report = inspect(&conn).unwrap();
        assert_eq!(report.tables.len(), 1);
        let users = &report.tables[0];
        assert_eq!(users.name, "users");
        assert_eq!(users.rows, 2);
        assert_eq!(users.pii_candidates, vec!["email", "full_name"]);
    }

    #[test]
    fn test_draft_config_suggestions() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, ssn TEXT,
                 password TEXT, birth_date TEXT, created_at TEXT, plain TEXT)",
        )
        .unwrap();
        let schema = load_schema(&conn).unwrap();
        let draft = draft_config(&schema);
        let users = &draft.tables["users"];
        assert_eq!(users.columns["email"].kind, "HmacSha256");
        assert_eq!(users.columns["email"].maxlen, 24);
        assert_eq!(users.columns["ssn"].kind, "SetNull");
        assert_eq!(users.columns["password"].kind, "SetValue");
        assert_eq!(users.columns["birth_date"].kind, "DateShift");
        assert_eq!(
            users.columns["birth_date"].params["max_days"],
            serde_yaml::Value::from(60)
        );
        assert_eq!(users.columns["created_at"].kind, "DateShift");
        assert!(!users.columns.contains_key("plain"));
        assert!(!users.columns.contains_key("id"));
    }

    #[test]
    fn test_draft_config_round_trips_through_yaml() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (email TEXT)").unwrap();
        let schema = load_schema(&conn).unwrap();
        let yaml = serde_yaml::to_string(&draft_config(&schema)).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.tables["t"].columns["email"].kind, "HmacSha256");
    }
}
