//! Identifier quoting for dynamically constructed SQL.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! point that splices an identifier into SQL text goes through [`quote_ident`].

/// Quote a SQLite identifier.
///
/// Wraps the name in double quotes and doubles any embedded double quote.
///
/// # Examples
///
/// ```
/// use sqlmask::core::identifier::quote_ident;
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("ta\"ble"), "\"ta\"\"ble\"");
/// ```
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a list of column names, preserving order.
#[must_use]
pub fn quote_idents(names: &[String]) -> Vec<String> {
    names.iter().map(|n| quote_ident(n)).collect()
}
