//! Core traits for store-agnostic reconciliation.
//!
//! - [`Store`]: run a statement against a database and return text rows
//! - [`Dialect`]: SQL syntax strategy for a database engine
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable quoting and literal rules
//! - **Template Method**: `Store::list_keys`, `row_count`, `list_tables` and
//!   `ping` are built on `execute_query` and the store's dialect, so a driver
//!   only has to move statements and rows.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::{ReconcileError, Result};

use super::schema::ColumnSpec;
use super::value::KeyValue;

/// Rows returned by a store, as text cells.
///
/// `None` cells are SQL NULL. Statements without a result set return an
/// output with no columns and no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Column labels, in select order. May be empty when no row was returned.
    pub columns: Vec<String>,
    /// Row cells, one vector per row.
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryOutput {
    /// Create an output from labels and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Output of a statement that returned no result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row was returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by label (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Interpret the first column of every row as a primary key.
    pub fn keys(&self, key: &ColumnSpec, context: &str) -> Result<Vec<KeyValue>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cell = row.first().ok_or_else(|| {
                    ReconcileError::parse(context, format!("row {} has no cells", i + 1))
                })?;
                let raw = cell.as_deref().ok_or_else(|| {
                    ReconcileError::parse(context, format!("row {} has a NULL key", i + 1))
                })?;
                KeyValue::parse(raw, key.kind).ok_or_else(|| {
                    ReconcileError::parse(
                        context,
                        format!("row {}: {:?} is not a valid {} key", i + 1, raw, key.name),
                    )
                })
            })
            .collect()
    }

    /// Interpret the output as a single integer cell (e.g. `COUNT(*)`).
    pub fn single_integer(&self, context: &str) -> Result<i64> {
        match self.rows.as_slice() {
            [row] => match row.first() {
                Some(Some(raw)) => raw.trim().parse::<i64>().map_err(|_| {
                    ReconcileError::parse(context, format!("{:?} is not an integer", raw))
                }),
                _ => Err(ReconcileError::parse(context, "expected one non-null cell")),
            },
            rows => Err(ReconcileError::parse(
                context,
                format!("expected exactly one row, got {}", rows.len()),
            )),
        }
    }

    /// Non-null values of the first column.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned().flatten())
            .collect()
    }
}

/// SQL syntax strategy for different database engines.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    ///
    /// - MySQL: `` `identifier` ``
    /// - PostgreSQL: `"identifier"`
    fn quote_ident(&self, name: &str) -> String;

    /// Render a text value as a quoted string literal.
    ///
    /// Returns a message when the value cannot be represented in this dialect.
    fn quote_text(&self, value: &str) -> std::result::Result<String, String>;

    /// Parse a string literal produced by [`Dialect::quote_text`] back into its value.
    fn decode_text(&self, literal: &str) -> Option<String>;

    /// Query listing the tables of the current database/schema, one per row.
    fn list_tables_query(&self) -> String;

    /// Render a timestamp literal.
    fn timestamp_literal(&self, ts: NaiveDateTime) -> String {
        format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S"))
    }

    /// Query listing every key of a table in ascending order.
    fn select_keys_query(&self, table: &str, key_column: &str) -> String {
        let key = self.quote_ident(key_column);
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            key,
            self.quote_ident(table),
            key
        )
    }

    /// Query counting the rows of a table.
    fn count_query(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_ident(table))
    }
}

/// A database the reconciliation reads from or writes to.
///
/// Implementations decide the transport (client process, native driver);
/// the core only sees statements going in and text rows coming out.
///
/// Errors:
/// - [`ReconcileError::StoreUnavailable`] when the store cannot be reached
/// - [`ReconcileError::RowExecution`] when the store rejected the statement
/// - [`ReconcileError::Parse`] when the store's output could not be interpreted
#[async_trait]
pub trait Store: Send + Sync {
    /// Short label used in logs and reports ("source", "target", ...).
    fn name(&self) -> &str;

    /// Statement dialect of this store.
    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement and return its rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryOutput>;

    /// List every primary key of a table, ascending.
    async fn list_keys(&self, table: &str, key: &ColumnSpec) -> Result<Vec<KeyValue>> {
        let sql = self.dialect().select_keys_query(table, &key.name);
        let output = self.execute_query(&sql).await?;
        output.keys(key, &format!("{} key list of {}", self.name(), table))
    }

    /// Count the rows of a table.
    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = self.dialect().count_query(table);
        let output = self.execute_query(&sql).await?;
        output.single_integer(&format!("{} row count of {}", self.name(), table))
    }

    /// List the tables of the store.
    async fn list_tables(&self) -> Result<BTreeSet<String>> {
        let sql = self.dialect().list_tables_query();
        let output = self.execute_query(&sql).await?;
        Ok(output.first_column().into_iter().collect())
    }

    /// Check that the store answers.
    async fn ping(&self) -> Result<()> {
        self.execute_query("SELECT 1").await.map(|_| ())
    }
}
