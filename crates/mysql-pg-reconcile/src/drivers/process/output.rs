//! Parsers for command-line client output.
//!
//! This is the only place that interprets client text. Both parsers are
//! strict: anything that does not fit the expected shape is a
//! [`ReconcileError::Parse`], never an empty result.

use crate::core::traits::QueryOutput;
use crate::error::{ReconcileError, Result};

/// NULL marker passed to `psql -P null=...`.
pub const PSQL_NULL: &str = "\\N";

/// Parse `mysql --batch` output: a tab-separated header line, then one line
/// per row with `\t`, `\n`, `\\` and `\0` escaped and NULL printed as `NULL`.
///
/// MySQL prints nothing at all for an empty result set, so empty output is
/// zero rows.
pub fn parse_mysql_batch(stdout: &str, context: &str) -> Result<QueryOutput> {
    let mut lines = stdout.lines();
    let Some(header) = lines.next() else {
        return Ok(QueryOutput::empty());
    };

    let columns: Vec<String> = header.split('\t').map(str::to_string).collect();
    let mut rows = Vec::new();

    for (i, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != columns.len() {
            return Err(ReconcileError::parse(
                context,
                format!(
                    "line {} has {} fields, header has {}",
                    i + 2,
                    fields.len(),
                    columns.len()
                ),
            ));
        }

        let row = fields
            .into_iter()
            .map(|field| {
                if field == "NULL" {
                    Ok(None)
                } else {
                    unescape_mysql(field)
                        .map(Some)
                        .ok_or_else(|| {
                            ReconcileError::parse(context, format!("bad escape in {:?}", field))
                        })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }

    Ok(QueryOutput::new(columns, rows))
}

fn unescape_mysql(field: &str) -> Option<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            't' => out.push('\t'),
            'n' => out.push('\n'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// Parse `psql --csv -P null=\N` output: a header record, then one record per row.
///
/// Empty output means the statement returned no result set. Whether that is
/// acceptable is decided by the caller.
pub fn parse_psql_csv(stdout: &str, context: &str) -> Result<QueryOutput> {
    if stdout.is_empty() {
        return Ok(QueryOutput::empty());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(stdout.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| ReconcileError::parse(context, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconcileError::parse(context, e))?;
        rows.push(
            record
                .iter()
                .map(|cell| (cell != PSQL_NULL).then(|| cell.to_string()))
                .collect(),
        );
    }

    Ok(QueryOutput::new(columns, rows))
}
