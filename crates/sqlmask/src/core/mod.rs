//! Core types shared across the library: cell values, identifier quoting,
//! and schema metadata.

pub mod identifier;
pub mod schema;
pub mod value;

pub use identifier::{quote_ident, quote_idents};
pub use schema::{table_order, Column, FkGroup, ForeignKey, Schema, SqlObject, Table};
pub use value::{tuple_key, Value};
