//! Read-only reporting over an input database: schema inspection with PII
//! heuristics, draft config generation, and the transformation plan.

mod inspect;
mod plan;

pub use inspect::{draft_config, inspect, InspectReport, TableInfo};
pub use plan::{plan, ColumnPlan, PlanReport, TablePlan};
