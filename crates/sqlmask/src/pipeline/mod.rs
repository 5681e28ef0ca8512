//! Per-table streaming copy: SELECT from the input, transform, INSERT into
//! the output, preserving source row order.

mod parallel;

use rusqlite::{params_from_iter, Connection, Statement};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::core::identifier::{quote_ident, quote_idents};
use crate::core::schema::Table;
use crate::core::value::{tuple_key, Value};
use crate::error::{MaskError, Result};
use crate::subset::{build_tuple_in, PkSet, CHUNK_SIZE};
use crate::transform::{RowContext, Transformer};
use parallel::{apply_transforms, run_parallel, BoundTransform};

/// Everything needed to copy one table's rows.
pub(crate) struct TableCopy<'a> {
    pub input: &'a Connection,
    pub table: &'a Table,
    /// Column name → transformer, as resolved for this table.
    pub transformers: &'a [(String, Box<dyn Transformer>)],
    pub salt: &'a str,
    pub seed: i64,
    pub jobs: usize,
    pub cancel: &'a CancellationToken,
}

/// Copy one table's data inside a single output transaction.
///
/// With a populated key set the source rows are fetched in 500-tuple
/// WHERE-IN chunks (tuples sorted by their dedup key); otherwise the whole
/// table streams in effective-PK order. Returns the number of rows written.
pub(crate) fn copy_table(
    copy: &TableCopy<'_>,
    output: &mut Connection,
    selection: Option<&PkSet>,
) -> Result<u64> {
    let table = copy.table;
    let col_names = table.column_names();
    let use_rowid = table.primary_keys.is_empty() && !table.without_rowid;

    let mut select_cols: Vec<String> = Vec::with_capacity(col_names.len() + 1);
    if use_rowid {
        select_cols.push("rowid".to_string());
    }
    select_cols.extend(quote_idents(&col_names));

    let transforms = bind_transforms(copy.transformers, &col_names, &table.name)?;

    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table.name),
        quote_idents(&col_names).join(", "),
        vec!["?"; col_names.len()].join(", ")
    );

    let order_by = build_order_by(table, use_rowid);
    let tx = output.transaction()?;
    let mut rows_written: u64 = 0;
    {
        let mut insert = tx
            .prepare(&insert_sql)
            .map_err(|e| MaskError::copy(&table.name, format!("prepare insert: {e}")))?;

        match selection {
            None => {
                let query = format!(
                    "SELECT {} FROM {} {}",
                    select_cols.join(", "),
                    quote_ident(&table.name),
                    order_by
                );
                rows_written += copy_query(copy, &query, &[], &transforms, use_rowid, &mut insert)?;
            }
            Some(set) => {
                let mut tuples = set.values_by_columns(&set.cols)?;
                tuples.sort_by_cached_key(|row| tuple_key(row));
                for chunk in tuples.chunks(CHUNK_SIZE) {
                    let (where_in, params) = build_tuple_in(&set.cols, chunk, use_rowid);
                    let query = format!(
                        "SELECT {} FROM {} WHERE {} {}",
                        select_cols.join(", "),
                        quote_ident(&table.name),
                        where_in,
                        order_by
                    );
                    rows_written +=
                        copy_query(copy, &query, &params, &transforms, use_rowid, &mut insert)?;
                }
            }
        }
    }
    tx.commit()
        .map_err(|e| MaskError::copy(&table.name, format!("commit: {e}")))?;
    Ok(rows_written)
}

/// Resolve configured transformers against the table's column positions.
fn bind_transforms<'a>(
    transformers: &'a [(String, Box<dyn Transformer>)],
    col_names: &[String],
    table: &str,
) -> Result<Vec<BoundTransform<'a>>> {
    transformers
        .iter()
        .map(|(column, transformer)| {
            let index = col_names.iter().position(|c| c == column).ok_or_else(|| {
                MaskError::Config(format!("transform column {table}.{column} does not exist"))
            })?;
            Ok(BoundTransform {
                index,
                column: column.as_str(),
                transformer: transformer.as_ref(),
            })
        })
        .collect()
}

fn copy_query(
    copy: &TableCopy<'_>,
    query: &str,
    params: &[&Value],
    transforms: &[BoundTransform<'_>],
    use_rowid: bool,
    insert: &mut Statement<'_>,
) -> Result<u64> {
    let table = copy.table;
    let mut stmt = copy
        .input
        .prepare(query)
        .map_err(|e| MaskError::copy(&table.name, format!("select: {e}")))?;
    let mut rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(|e| MaskError::copy(&table.name, format!("select: {e}")))?;

    let width = if use_rowid {
        table.columns.len() + 1
    } else {
        table.columns.len()
    };

    let mut next_row = || -> Result<Option<(Vec<Value>, RowContext)>> {
        let Some(row) = rows
            .next()
            .map_err(|e| MaskError::copy(&table.name, format!("scan row: {e}")))?
        else {
            return Ok(None);
        };
        let mut scanned = Vec::with_capacity(width);
        for i in 0..width {
            scanned.push(Value::from(row.get_ref(i)?));
        }
        Ok(Some(build_row(scanned, copy, use_rowid)))
    };

    let mut written: u64 = 0;
    if copy.jobs > 1 && !transforms.is_empty() {
        run_parallel(copy.jobs, transforms, copy.cancel, next_row, |values| {
            insert
                .execute(params_from_iter(values.iter()))
                .map_err(|e| MaskError::copy(&table.name, format!("insert: {e}")))?;
            written += 1;
            Ok(())
        })?;
    } else {
        while let Some((mut values, ctx)) = next_row()? {
            if copy.cancel.is_cancelled() {
                return Err(MaskError::Cancelled);
            }
            apply_transforms(transforms, &mut values, &ctx)?;
            insert
                .execute(params_from_iter(values.iter()))
                .map_err(|e| MaskError::copy(&table.name, format!("insert: {e}")))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Split off the rowid (when selected) and build the row's transform context.
fn build_row(scanned: Vec<Value>, copy: &TableCopy<'_>, use_rowid: bool) -> (Vec<Value>, RowContext) {
    let table = copy.table;
    let (rowid, values) = if use_rowid {
        let mut iter = scanned.into_iter();
        let rowid = iter.next().unwrap_or(Value::Null);
        (Some(rowid), iter.collect::<Vec<Value>>())
    } else {
        (None, scanned)
    };

    let pk = if !table.primary_keys.is_empty() {
        table
            .primary_keys
            .iter()
            .filter_map(|pk_col| {
                table
                    .columns
                    .iter()
                    .position(|c| &c.name == pk_col)
                    .map(|i| values[i].clone())
            })
            .collect()
    } else if let Some(rowid) = rowid {
        vec![rowid]
    } else {
        vec![Value::Text(row_fingerprint(&values))]
    };

    let ctx = RowContext {
        table: table.name.clone(),
        pk,
        seed: copy.seed,
        salt: copy.salt.to_string(),
    };
    (values, ctx)
}

fn build_order_by(table: &Table, use_rowid: bool) -> String {
    if !table.primary_keys.is_empty() {
        return format!("ORDER BY {}", quote_idents(&table.primary_keys).join(", "));
    }
    if use_rowid {
        return "ORDER BY rowid".to_string();
    }
    String::new()
}

/// Surrogate key for rows with neither a declared PK nor a rowid: the hex
/// SHA-256 of the NUL-joined canonical string forms of the row's values.
fn row_fingerprint(values: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.display_string().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
