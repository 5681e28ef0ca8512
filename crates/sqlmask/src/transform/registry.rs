//! Transformer registry: name → factory resolution.

use std::collections::{BTreeMap, HashMap};

use rusqlite::Connection;

use super::builtins::{
    DateShift, FakerAddress, FakerEmail, FakerName, FakerPhone, HashSha256, HmacSha256,
    MapReplace, RegexReplace, SetNull, SetValue, StableTokenize,
};
use super::Transformer;
use crate::config::{ColumnRule, TableRules};
use crate::core::identifier::quote_ident;
use crate::core::Value;
use crate::error::{MaskError, Result};

/// A transformer factory: builds an instance from a column rule and the
/// run-level salt.
pub type Factory = Box<dyn Fn(&ColumnRule, &str) -> Result<Box<dyn Transformer>> + Send + Sync>;

/// Registry of transformer factories, keyed by lowercased name.
///
/// [`Registry::register`] is the extension point for compiled-in custom
/// transformers.
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-populated with every built-in transformer.
    /// `MapReplace` also answers to the short name `map`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("HashSha256", |rule, salt| {
            Ok(Box::new(HashSha256::new(salt, rule.maxlen)))
        });
        registry.register("HmacSha256", |rule, salt| {
            Ok(Box::new(HmacSha256::new(salt, rule.maxlen)))
        });
        registry.register("StableTokenize", |rule, _salt| {
            Ok(Box::new(StableTokenize::new(rule.maxlen)))
        });
        registry.register("RegexReplace", |rule, _salt| {
            let pattern = rule.pattern.as_deref().unwrap_or_default();
            let replace = rule.replace.clone().unwrap_or_default();
            Ok(Box::new(RegexReplace::new(pattern, replace)?))
        });
        registry.register("SetNull", |_rule, _salt| Ok(Box::new(SetNull)));
        registry.register("SetValue", |rule, _salt| {
            Ok(Box::new(SetValue::new(literal_value(rule.value.as_ref())?)))
        });
        registry.register("FakerName", |_rule, _salt| Ok(Box::new(FakerName)));
        registry.register("FakerEmail", |_rule, _salt| Ok(Box::new(FakerEmail)));
        registry.register("FakerAddress", |_rule, _salt| Ok(Box::new(FakerAddress)));
        registry.register("FakerPhone", |_rule, _salt| Ok(Box::new(FakerPhone)));
        registry.register("DateShift", |rule, _salt| {
            let max_days = match rule.params.get("max_days") {
                Some(v) => yaml_int(v).ok_or_else(|| {
                    MaskError::Config(format!("DateShift max_days must be an integer, got {v:?}"))
                })?,
                None => 30,
            };
            Ok(Box::new(DateShift::new(max_days)))
        });
        registry.register("MapReplace", |rule, _salt| {
            Ok(Box::new(MapReplace::new(rule.map.clone())))
        });
        registry.register("Map", |rule, _salt| {
            Ok(Box::new(MapReplace::new(rule.map.clone())))
        });
        registry
    }

    /// Register a factory under a case-insensitive name.
    pub fn register(
        &mut self,
        name: &str,
        factory: impl Fn(&ColumnRule, &str) -> Result<Box<dyn Transformer>> + Send + Sync + 'static,
    ) {
        if name.is_empty() {
            return;
        }
        self.factories.insert(name.to_lowercase(), Box::new(factory));
    }

    /// Build a transformer for a single rule. Unknown names are
    /// configuration errors.
    pub fn build(&self, rule: &ColumnRule, salt: &str) -> Result<Box<dyn Transformer>> {
        match self.factories.get(&rule.kind.to_lowercase()) {
            Some(factory) => factory(rule, salt),
            None => Err(MaskError::Config(format!(
                "unknown transformer type: {}",
                rule.kind
            ))),
        }
    }

    /// Build the transformers for one table, resolving lookup tables against
    /// the input database.
    ///
    /// When a rule names a `lookup_table`, its `(lookup_key, lookup_value)`
    /// pairs are preloaded and overlaid atop the inline map; a non-empty
    /// result becomes a `MapReplace` regardless of the declared type, while
    /// an empty result falls back to the plain rule. The returned list is
    /// sorted by column name.
    pub fn build_for_table(
        &self,
        conn: &Connection,
        rules: &TableRules,
        table: &str,
        salt: &str,
    ) -> Result<Vec<(String, Box<dyn Transformer>)>> {
        let mut out = Vec::with_capacity(rules.columns.len());
        for (column, rule) in &rules.columns {
            let transformer = self
                .build_with_lookup(conn, rule, salt)
                .map_err(|e| match e {
                    MaskError::Config(msg) => MaskError::Config(format!(
                        "build transformer {table}.{column}: {msg}"
                    )),
                    other => other,
                })?;
            out.push((column.clone(), transformer));
        }
        Ok(out)
    }

    fn build_with_lookup(
        &self,
        conn: &Connection,
        rule: &ColumnRule,
        salt: &str,
    ) -> Result<Box<dyn Transformer>> {
        if rule.lookup_table.is_some() {
            let mapping = load_lookup_map(conn, rule)?;
            if !mapping.is_empty() {
                return Ok(Box::new(MapReplace::new(mapping)));
            }
        }
        self.build(rule, salt)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Convert a YAML literal into a cell value for `SetValue`.
/// Booleans store as 0/1 integers; sequences and maps are rejected.
fn literal_value(value: Option<&serde_yaml::Value>) -> Result<Value> {
    use serde_yaml::Value as Yaml;
    match value {
        None | Some(Yaml::Null) => Ok(Value::Null),
        Some(Yaml::Bool(b)) => Ok(Value::Integer(i64::from(*b))),
        Some(Yaml::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Real(f))
            } else {
                Err(MaskError::Config(format!("unsupported number literal: {n}")))
            }
        }
        Some(Yaml::String(s)) => Ok(Value::Text(s.clone())),
        Some(other) => Err(MaskError::Config(format!(
            "SetValue literal must be a scalar, got {other:?}"
        ))),
    }
}

fn yaml_int(value: &serde_yaml::Value) -> Option<i64> {
    match value {
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

fn load_lookup_map(conn: &Connection, rule: &ColumnRule) -> Result<BTreeMap<String, String>> {
    let table = rule.lookup_table.as_deref().unwrap_or_default();
    let (Some(key_col), Some(value_col)) = (rule.lookup_key.as_deref(), rule.lookup_value.as_deref())
    else {
        return Err(MaskError::Config(
            "lookup_table requires lookup_key and lookup_value".to_string(),
        ));
    };

    let mut mapping = rule.map.clone();
    let query = format!(
        "SELECT {}, {} FROM {}",
        quote_ident(key_col),
        quote_ident(value_col),
        quote_ident(table)
    );
    let mut stmt = conn
        .prepare(&query)
        .map_err(|e| MaskError::Config(format!("lookup table {table}: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| MaskError::Config(format!("lookup table {table}: {e}")))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| MaskError::Config(format!("iterate lookup table {table}: {e}")))?
    {
        let key = Value::from(row.get_ref(0)?).display_string();
        let value = Value::from(row.get_ref(1)?).display_string();
        mapping.insert(key, value);
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_row;

    fn rule(kind: &str) -> ColumnRule {
        ColumnRule {
            kind: kind.to_string(),
            ..ColumnRule::default()
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = Registry::with_builtins();
        for kind in ["setnull", "SetNull", "SETNULL"] {
            let tr = registry.build(&rule(kind), "salt").unwrap();
            assert_eq!(tr.name(), "SetNull");
        }
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = Registry::with_builtins();
        let err = registry.build(&rule("Nope"), "salt").unwrap_err();
        assert!(matches!(err, MaskError::Config(_)));
    }

    #[test]
    fn test_map_alias() {
        let registry = Registry::with_builtins();
        let mut r = rule("map");
        r.map.insert("a".into(), "b".into());
        let tr = registry.build(&r, "salt").unwrap();
        assert_eq!(tr.name(), "MapReplace");
    }

    #[test]
    fn test_date_shift_param_parsing() {
        let registry = Registry::with_builtins();
        let mut r = rule("DateShift");
        r.params
            .insert("max_days".to_string(), serde_yaml::Value::from(60));
        assert!(registry.build(&r, "salt").is_ok());

        r.params
            .insert("max_days".to_string(), serde_yaml::Value::from("sixty"));
        assert!(registry.build(&r, "salt").is_err());
    }

    #[test]
    fn test_set_value_literals() {
        let registry = Registry::with_builtins();
        let row = test_row();

        let mut r = rule("SetValue");
        r.value = Some(serde_yaml::Value::from("redacted"));
        let tr = registry.build(&r, "salt").unwrap();
        assert_eq!(
            tr.transform(Value::Integer(1), &row).unwrap(),
            Value::Text("redacted".into())
        );

        r.value = Some(serde_yaml::Value::from(true));
        let tr = registry.build(&r, "salt").unwrap();
        assert_eq!(tr.transform(Value::Null, &row).unwrap(), Value::Integer(1));

        r.value = Some(serde_yaml::Value::Sequence(vec![]));
        assert!(registry.build(&r, "salt").is_err());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = Registry::with_builtins();
        registry.register("Upper", |_rule, _salt| {
            struct Upper;
            impl Transformer for Upper {
                fn name(&self) -> &str {
                    "Upper"
                }
                fn transform(&self, value: Value, _row: &crate::transform::RowContext) -> Result<Value> {
                    Ok(Value::Text(value.display_string().to_uppercase()))
                }
            }
            Ok(Box::new(Upper))
        });
        let tr = registry.build(&rule("upper"), "salt").unwrap();
        assert_eq!(
            tr.transform(Value::Text("abc".into()), &test_row()).unwrap(),
            Value::Text("ABC".into())
        );
    }

    #[test]
    fn test_lookup_requires_key_and_value() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = Registry::with_builtins();
        let mut rules = TableRules::default();
        let mut r = rule("MapReplace");
        r.lookup_table = Some("codes".to_string());
        rules.columns.insert("country".to_string(), r);
        let err = registry
            .build_for_table(&conn, &rules, "users", "salt")
            .unwrap_err();
        assert!(err.to_string().contains("lookup_key"));
    }

    #[test]
    fn test_lookup_overlays_inline_map() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE codes (k TEXT, v TEXT)", []).unwrap();
        conn.execute("INSERT INTO codes VALUES ('US', 'from_table'), ('DE', 'de')", [])
            .unwrap();

        let registry = Registry::with_builtins();
        let mut rules = TableRules::default();
        let mut r = rule("MapReplace");
        r.lookup_table = Some("codes".to_string());
        r.lookup_key = Some("k".to_string());
        r.lookup_value = Some("v".to_string());
        r.map.insert("US".to_string(), "inline".to_string());
        r.map.insert("FR".to_string(), "fr".to_string());
        rules.columns.insert("country".to_string(), r);

        let transformers = registry
            .build_for_table(&conn, &rules, "users", "salt")
            .unwrap();
        assert_eq!(transformers.len(), 1);
        let (_, tr) = &transformers[0];
        let row = test_row();
        // Lookup rows override inline entries; inline-only entries survive.
        assert_eq!(
            tr.transform(Value::Text("US".into()), &row).unwrap(),
            Value::Text("from_table".into())
        );
        assert_eq!(
            tr.transform(Value::Text("FR".into()), &row).unwrap(),
            Value::Text("fr".into())
        );
    }
}
