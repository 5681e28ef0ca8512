//! Transformation plan: which transformer applies to which column.

use rusqlite::Connection;
use serde::Serialize;

use crate::catalog::load_schema;
use crate::config::Config;
use crate::core::schema::table_order;
use crate::error::Result;
use crate::transform::Registry;

/// One configured column and the transformer it resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnPlan {
    pub column: String,
    pub transformer: String,
}

/// Plan for one included table.
#[derive(Debug, Clone, Serialize)]
pub struct TablePlan {
    pub name: String,
    pub columns: Vec<ColumnPlan>,
}

/// Full transformation plan, tables in topological order.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub tables: Vec<TablePlan>,
}

/// Resolve the plan for an input database and config.
///
/// Each configured rule is built against the registry (with an empty salt),
/// so unknown transformer types and invalid patterns fail here, before any
/// copy is attempted.
pub fn plan(conn: &Connection, config: &Config, registry: &Registry) -> Result<PlanReport> {
    let schema = load_schema(conn)?;
    let filter = config.table_filter()?;
    let mut tables = Vec::new();
    for name in table_order(&schema) {
        if !filter.is_included(&name) {
            continue;
        }
        let mut columns = Vec::new();
        if let Some(rules) = config.tables.get(&name) {
            for (column, rule) in &rules.columns {
                let transformer = registry.build(rule, "")?;
                columns.push(ColumnPlan {
                    column: column.clone(),
                    transformer: transformer.name().to_string(),
                });
            }
        }
        tables.push(TablePlan { name, columns });
    }
    Ok(PlanReport { tables })
}
