//! Deterministic value transformers.
//!
//! A transformer is a named, stateless (after construction) function from
//! `(value, RowContext)` to a new value. Given the same
//! `(salt, seed, table, primary key, value)` tuple it must produce the same
//! output across runs and machines; every randomized transformer draws from
//! a PRNG freshly seeded per row (see [`rng`]), so column evaluation order
//! cannot affect results.

mod builtins;
mod registry;
pub mod rng;

pub use builtins::{
    DateShift, FakerAddress, FakerEmail, FakerName, FakerPhone, HashSha256, HmacSha256,
    MapReplace, RegexReplace, SetNull, SetValue, StableTokenize,
};
pub use registry::Registry;

use crate::core::Value;
use crate::error::Result;

/// Per-row context handed to every transformer invocation.
///
/// The primary key tuple is the table's effective PK; for tables with
/// neither a declared PK nor a rowid it is the single-element row
/// fingerprint (see the copy pipeline).
#[derive(Debug, Clone)]
pub struct RowContext {
    /// Source table name.
    pub table: String,

    /// Primary key values of the source row.
    pub pk: Vec<Value>,

    /// Run-level seed.
    pub seed: i64,

    /// Run-level salt.
    pub salt: String,
}

/// A named value-to-value masking function.
///
/// Implementations are constructed once per table and must be safe to call
/// concurrently; none of the built-ins mutate state during `transform`.
pub trait Transformer: Send + Sync {
    /// Canonical transformer name.
    fn name(&self) -> &str;

    /// Transform one cell value.
    fn transform(&self, value: Value, row: &RowContext) -> Result<Value>;
}

impl std::fmt::Debug for dyn Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer").field("name", &self.name()).finish()
    }
}

#[cfg(test)]
pub(crate) fn test_row() -> RowContext {
    RowContext {
        table: "users".to_string(),
        pk: vec![Value::Integer(1)],
        seed: 42,
        salt: "salt".to_string(),
    }
}
