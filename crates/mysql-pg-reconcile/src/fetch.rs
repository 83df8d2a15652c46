//! Row fetching: full source rows for a list of primary keys.

use tracing::debug;

use crate::core::schema::{ColumnSpec, TableSpec};
use crate::core::traits::Store;
use crate::core::value::{KeyValue, Row, Value};
use crate::encode::key_literal;
use crate::error::{ReconcileError, Result};

/// Fetch the rows of `table` whose primary key is in `keys`.
///
/// Selects every non-synthesized column in declaration order, `chunk_size`
/// keys per statement. Keys that no longer exist are silently absent from the
/// result. Row order follows the store, not `keys`.
pub async fn fetch_rows(
    store: &dyn Store,
    table: &TableSpec,
    keys: &[KeyValue],
    chunk_size: usize,
) -> Result<Vec<Row>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let dialect = store.dialect();
    let key_column = table.key_column()?;
    let columns: Vec<_> = table.source_columns().collect();
    let select_list = columns
        .iter()
        .map(|c| dialect.quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let context = format!("{} rows of {}", store.name(), table.name);

    let mut rows = Vec::with_capacity(keys.len());
    for chunk in keys.chunks(chunk_size.max(1)) {
        let key_list = chunk
            .iter()
            .map(|k| key_literal(dialect, k, key_column).map(|l| l.into_string()))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            select_list,
            dialect.quote_ident(&table.name),
            dialect.quote_ident(&key_column.name),
            key_list
        );

        let output = store.execute_query(&sql).await?;
        debug!(
            "{}: fetched {} of {} requested rows",
            table.name,
            output.len(),
            chunk.len()
        );

        for (i, cells) in output.rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(ReconcileError::parse(
                    &context,
                    format!(
                        "row {} has {} cells, expected {}",
                        i + 1,
                        cells.len(),
                        columns.len()
                    ),
                ));
            }

            let row: Row = columns
                .iter()
                .zip(cells)
                .map(|(column, cell)| (column.name.clone(), decode_cell(column, cell.as_deref())))
                .collect();
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Decode a cell by its column kind.
///
/// A numeric cell that does not parse is kept as text so the encoder fails
/// that row alone instead of the whole fetch.
fn decode_cell(column: &ColumnSpec, cell: Option<&str>) -> Value {
    match Value::from_cell(cell, column.kind, &column.name) {
        Ok(value) => value,
        Err(e) => {
            debug!("{}", e);
            Value::Text(cell.unwrap_or_default().to_string())
        }
    }
}
