//! # sqlmask
//!
//! Deterministic SQLite anonymization and subsetting library.
//!
//! Given an input database file, a masking configuration, a salt, and a
//! seed, sqlmask produces an output file with the same schema whose rows
//! have selected columns replaced by deterministic transformer output, and
//! which can optionally be restricted to a foreign-key-closed subset of the
//! input.
//!
//! - **Deterministic masking**: every transformer yields the same output
//!   for the same `(salt, seed, table, primary key, value)` across runs and
//!   machines.
//! - **Subsetting**: user-selected root rows are expanded to a subset
//!   closed under foreign keys, so the output passes FK validation.
//! - **Streaming copy**: tables are copied in FK-topological order with
//!   optional order-preserving parallel transformation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlmask::{Config, FkMode, MaskOptions, Orchestrator, TriggerMode};
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> sqlmask::Result<()> {
//!     let options = MaskOptions {
//!         input: "prod.sqlite".into(),
//!         output: "masked.sqlite".into(),
//!         config: Config::load(Some("mask.yaml".as_ref()))?,
//!         salt: "salt".to_string(),
//!         seed: 42,
//!         fk_mode: FkMode::On,
//!         triggers: TriggerMode::On,
//!         jobs: 4,
//!         temp_dir: None,
//!         subset: false,
//!     };
//!     let report = Orchestrator::new(options)?.run(&CancellationToken::new())?;
//!     println!("copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
mod pipeline;
pub mod report;
pub mod subset;
pub mod transform;

// Re-exports for convenient access
pub use config::{ColumnRule, Config, RootConfig, SubsetConfig, TableFilter, TableRules};
pub use core::{Schema, Table, Value};
pub use error::{MaskError, Result};
pub use orchestrator::{FkMode, MaskOptions, MaskReport, Orchestrator, TriggerMode};
pub use report::{draft_config, inspect, plan, InspectReport, PlanReport};
pub use subset::{PkSet, Selection};
pub use transform::{Registry, RowContext, Transformer};
