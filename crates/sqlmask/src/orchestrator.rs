//! Run orchestration: the staged sequence from input file to masked output.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rusqlite::Connection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::{load_schema, open_input, open_output};
use crate::config::{Config, TableFilter};
use crate::core::schema::{table_order, Schema};
use crate::error::{MaskError, Result};
use crate::pipeline::{copy_table, TableCopy};
use crate::subset::{build_selection, Selection};
use crate::transform::{Registry, Transformer};

/// Foreign-key enforcement on the output. There is deliberately no default:
/// callers must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkMode {
    On,
    Off,
}

impl FromStr for FkMode {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on" => Ok(FkMode::On),
            "off" => Ok(FkMode::Off),
            other => Err(MaskError::Config(format!("invalid fk mode: {other}"))),
        }
    }
}

impl fmt::Display for FkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FkMode::On => "on",
            FkMode::Off => "off",
        })
    }
}

/// Whether triggers are recreated on the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    On,
    Off,
}

impl FromStr for TriggerMode {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on" => Ok(TriggerMode::On),
            "off" => Ok(TriggerMode::Off),
            other => Err(MaskError::Config(format!("invalid trigger mode: {other}"))),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerMode::On => "on",
            TriggerMode::Off => "off",
        })
    }
}

/// Options for one masking run.
#[derive(Debug, Clone)]
pub struct MaskOptions {
    /// Input database path, opened read-only.
    pub input: PathBuf,

    /// Output database path. Any pre-existing file is removed first.
    pub output: PathBuf,

    /// Masking configuration.
    pub config: Config,

    /// Salt for deterministic hashing.
    pub salt: String,

    /// Seed for deterministic generation.
    pub seed: i64,

    /// Foreign-key enforcement on the output.
    pub fk_mode: FkMode,

    /// Trigger recreation on the output.
    pub triggers: TriggerMode,

    /// Worker count for parallel transformation. Clamped to at least 1.
    pub jobs: usize,

    /// Optional temporary directory for the output connection.
    pub temp_dir: Option<PathBuf>,

    /// Force subsetting even when the config carries no `subset` section.
    pub subset: bool,
}

/// Result of a masking run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaskReport {
    /// Tables whose data was copied.
    pub tables_copied: usize,

    /// Tables skipped by filtering or subset gating.
    pub tables_skipped: usize,

    /// Total rows written to the output.
    pub rows_copied: u64,
}

/// Masking orchestrator.
pub struct Orchestrator {
    options: MaskOptions,
    registry: Registry,
}

impl Orchestrator {
    /// Create a new orchestrator with the built-in transformer registry.
    pub fn new(mut options: MaskOptions) -> Result<Self> {
        if options.input.as_os_str().is_empty() || options.output.as_os_str().is_empty() {
            return Err(MaskError::Config(
                "input and output paths are required".to_string(),
            ));
        }
        if options.jobs < 1 {
            options.jobs = 1;
        }
        Ok(Self {
            options,
            registry: Registry::with_builtins(),
        })
    }

    /// Replace the transformer registry (for compiled-in extensions).
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Run the copy.
    ///
    /// Stages: remove stale output, open connections, set FK enforcement,
    /// introspect, resolve transformers, optionally solve the subset, create
    /// tables, copy data per table, replay views/indexes/triggers.
    pub fn run(&self, cancel: &CancellationToken) -> Result<MaskReport> {
        let options = &self.options;

        match std::fs::remove_file(&options.output) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = options.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let input = open_input(&options.input)?;
        let mut output = open_output(&options.output, options.temp_dir.as_deref())?;
        output.pragma_update(
            None,
            "foreign_keys",
            match options.fk_mode {
                FkMode::On => "ON",
                FkMode::Off => "OFF",
            },
        )?;

        let schema = load_schema(&input)?;
        let order = table_order(&schema);
        let filter = options.config.table_filter()?;

        // Transformers are resolved before anything is written, so every
        // configuration error is raised while the output is still empty.
        let transformers = self.resolve_transformers(&input, &schema, &order, &filter)?;

        let selection = if options.subset || options.config.subset.is_some() {
            Some(build_selection(&input, &schema, &options.config, cancel)?)
        } else {
            None
        };

        create_tables(&mut output, &schema, &order, &filter)?;

        let report = self.copy_data(
            &input,
            &mut output,
            &schema,
            &order,
            &filter,
            &transformers,
            selection.as_ref(),
            cancel,
        )?;

        create_post_data(&mut output, &schema, options.triggers)?;

        info!("copy complete");
        Ok(report)
    }

    fn resolve_transformers(
        &self,
        input: &Connection,
        schema: &Schema,
        order: &[String],
        filter: &TableFilter,
    ) -> Result<BTreeMap<String, Vec<(String, Box<dyn Transformer>)>>> {
        let mut resolved = BTreeMap::new();
        for name in order {
            if !filter.is_included(name) || !schema.tables.contains_key(name) {
                continue;
            }
            let Some(rules) = self.options.config.tables.get(name) else {
                continue;
            };
            let transformers =
                self.registry
                    .build_for_table(input, rules, name, &self.options.salt)?;
            if !transformers.is_empty() {
                resolved.insert(name.clone(), transformers);
            }
        }
        Ok(resolved)
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_data(
        &self,
        input: &Connection,
        output: &mut Connection,
        schema: &Schema,
        order: &[String],
        filter: &TableFilter,
        transformers: &BTreeMap<String, Vec<(String, Box<dyn Transformer>)>>,
        selection: Option<&Selection>,
        cancel: &CancellationToken,
    ) -> Result<MaskReport> {
        let options = &self.options;
        let mut report = MaskReport::default();
        let empty = Vec::new();

        for name in order {
            if cancel.is_cancelled() {
                return Err(MaskError::Cancelled);
            }
            let Some(table) = schema.tables.get(name) else {
                continue;
            };
            if !filter.is_included(name) {
                info!("skip table {}", name);
                report.tables_skipped += 1;
                continue;
            }
            let selected = match selection {
                None => None,
                Some(selection) => match selection.get(name) {
                    Some(set) => Some(set),
                    None => {
                        info!("skip table {} (not selected)", name);
                        report.tables_skipped += 1;
                        continue;
                    }
                },
            };
            info!("copy table {}", name);
            let copy = TableCopy {
                input,
                table,
                transformers: transformers.get(name).unwrap_or(&empty),
                salt: &options.salt,
                seed: options.seed,
                jobs: options.jobs,
                cancel,
            };
            report.rows_copied += copy_table(&copy, output, selected)?;
            report.tables_copied += 1;
        }
        Ok(report)
    }
}

fn create_tables(
    output: &mut Connection,
    schema: &Schema,
    order: &[String],
    filter: &TableFilter,
) -> Result<()> {
    let tx = output.transaction()?;
    for name in order {
        if !filter.is_included(name) {
            continue;
        }
        let Some(table) = schema.tables.get(name) else {
            continue;
        };
        tx.execute_batch(&table.sql)
            .map_err(|e| MaskError::copy(name, format!("create table: {e}")))?;
    }
    tx.commit()?;
    Ok(())
}

fn create_post_data(output: &mut Connection, schema: &Schema, triggers: TriggerMode) -> Result<()> {
    let tx = output.transaction()?;
    for view in &schema.views {
        if view.sql.is_empty() {
            continue;
        }
        tx.execute_batch(&view.sql)
            .map_err(|e| MaskError::copy(&view.name, format!("create view: {e}")))?;
    }
    for index in &schema.indexes {
        if index.sql.is_empty() {
            continue;
        }
        tx.execute_batch(&index.sql)
            .map_err(|e| MaskError::copy(&index.name, format!("create index: {e}")))?;
    }
    if triggers == TriggerMode::On {
        for trigger in &schema.triggers {
            if trigger.sql.is_empty() {
                continue;
            }
            tx.execute_batch(&trigger.sql)
                .map_err(|e| MaskError::copy(&trigger.name, format!("create trigger: {e}")))?;
        }
    }
    tx.commit()?;
    Ok(())
}
