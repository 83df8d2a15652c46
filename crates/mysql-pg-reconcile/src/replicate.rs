//! Batch replication of missing rows from source to target.
//!
//! Keys are processed in contiguous batches. For every batch the rows are
//! fetched from the source, each row is encoded into one `INSERT` or `UPDATE`,
//! and statements are executed one at a time against the target. A failing
//! row is recorded and the batch moves on; only an unavailable store stops
//! the run. Rows written before a stop stay written, so a re-run picks up
//! where this one ended.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{MigrationConfig, ReplicationMode};
use crate::core::schema::TableSpec;
use crate::core::traits::Store;
use crate::core::value::{KeySet, KeyValue, Row, Value};
use crate::encode::Encoder;
use crate::error::{ReconcileError, Result};
use crate::fetch::fetch_rows;

/// Batching parameters.
#[derive(Debug, Clone)]
pub struct ReplicateOptions {
    pub batch_size: usize,
    /// Pause between two batches (not after the last).
    pub batch_delay: Duration,
    pub fetch_chunk_size: usize,
}

impl Default for ReplicateOptions {
    fn default() -> Self {
        Self::from_config(&MigrationConfig::default())
    }
}

impl ReplicateOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            batch_delay: config.batch_delay(),
            fetch_chunk_size: config.fetch_chunk_size,
        }
    }
}

/// Category of a row failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Encoding,
    Execution,
    Timeout,
}

/// A row that could not be replicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFailure {
    pub key: KeyValue,
    pub reason: String,
    pub kind: FailureKind,
}

impl RowFailure {
    fn from_error(key: &KeyValue, error: &ReconcileError) -> Self {
        let kind = match error {
            ReconcileError::Encoding { .. } => FailureKind::Encoding,
            ReconcileError::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Execution,
        };
        Self {
            key: key.clone(),
            reason: error.to_string(),
            kind,
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: usize,
    /// Rows fetched from the source and sent to the target.
    pub attempted: usize,
    pub succeeded: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Requested keys no longer present in the source.
    pub skipped: usize,
    pub failures: Vec<RowFailure>,
}

impl BatchResult {
    fn new(batch_index: usize) -> Self {
        Self {
            batch_index,
            ..Default::default()
        }
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// Accumulated outcome of replicating one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    pub table: String,
    pub total_attempted: usize,
    pub total_succeeded: usize,
    pub total_inserted: usize,
    pub total_updated: usize,
    pub total_skipped: usize,
    pub batches: Vec<BatchResult>,
}

impl MigrationReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Add a batch to the totals.
    pub fn record(&mut self, batch: BatchResult) {
        self.total_attempted += batch.attempted;
        self.total_succeeded += batch.succeeded;
        self.total_inserted += batch.inserted;
        self.total_updated += batch.updated;
        self.total_skipped += batch.skipped;
        self.batches.push(batch);
    }

    pub fn failed(&self) -> usize {
        self.total_attempted - self.total_succeeded
    }

    /// Every row failure, in batch order.
    pub fn failures(&self) -> impl Iterator<Item = &RowFailure> {
        self.batches.iter().flat_map(|b| b.failures.iter())
    }
}

/// Split keys into contiguous batches of at most `batch_size`, in input order.
pub fn partition(keys: &[KeyValue], batch_size: usize) -> std::slice::Chunks<'_, KeyValue> {
    keys.chunks(batch_size.max(1))
}

/// Replays source rows into the target.
pub struct Replicator {
    source: Arc<dyn Store>,
    target: Arc<dyn Store>,
    options: ReplicateOptions,
    migration_time: DateTime<Utc>,
    cancel: CancellationToken,
}

impl Replicator {
    pub fn new(source: Arc<dyn Store>, target: Arc<dyn Store>, options: ReplicateOptions) -> Self {
        Self {
            source,
            target,
            options,
            migration_time: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Timestamp written into synthesized timestamp columns.
    pub fn with_migration_time(mut self, time: DateTime<Utc>) -> Self {
        self.migration_time = time;
        self
    }

    /// Token checked between batches.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replicate the rows of `keys` from source to target.
    pub async fn replicate(
        &self,
        table: &TableSpec,
        keys: &[KeyValue],
        mode: ReplicationMode,
    ) -> Result<MigrationReport> {
        table.key_column()?;
        let mut report = MigrationReport::new(&table.name);
        if keys.is_empty() {
            return Ok(report);
        }

        let mut existing = match mode {
            ReplicationMode::Upsert => {
                let target_key = table.target_key_column()?;
                self.target
                    .list_keys(table.target_table(), &target_key)
                    .await?
                    .into_iter()
                    .collect()
            }
            ReplicationMode::InsertOnly => KeySet::new(),
        };

        let encoder = Encoder::new(self.target.dialect(), self.migration_time);
        let total_batches = keys.len().div_ceil(self.options.batch_size.max(1));
        info!(
            "{}: replicating {} keys in {} batches ({:?})",
            table.name,
            keys.len(),
            total_batches,
            mode
        );

        for (index, batch) in partition(keys, self.options.batch_size).enumerate() {
            if index > 0 && !self.options.batch_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.options.batch_delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                warn!(
                    "{}: cancelled after {} of {} batches (attempted={} succeeded={})",
                    table.name,
                    index,
                    total_batches,
                    report.total_attempted,
                    report.total_succeeded
                );
                return Err(ReconcileError::Cancelled);
            }

            let result = self
                .replicate_batch(table, index, batch, mode, &encoder, &mut existing)
                .await?;

            info!(
                "{}: batch {}/{}: attempted={} succeeded={} failed={} skipped={}",
                table.name,
                index + 1,
                total_batches,
                result.attempted,
                result.succeeded,
                result.failed(),
                result.skipped
            );
            report.record(result);
        }

        Ok(report)
    }

    async fn replicate_batch(
        &self,
        table: &TableSpec,
        index: usize,
        batch: &[KeyValue],
        mode: ReplicationMode,
        encoder: &Encoder<'_>,
        existing: &mut KeySet,
    ) -> Result<BatchResult> {
        let mut result = BatchResult::new(index);
        let key_column = table.key_column()?;

        let rows = match fetch_rows(
            self.source.as_ref(),
            table,
            batch,
            self.options.fetch_chunk_size,
        )
        .await
        {
            Ok(rows) => rows,
            Err(e @ ReconcileError::Timeout { .. }) => {
                warn!("{}: batch {} fetch timed out: {}", table.name, index + 1, e);
                result.attempted = batch.len();
                result.failures = batch.iter().map(|k| RowFailure::from_error(k, &e)).collect();
                return Ok(result);
            }
            Err(e) => return Err(e),
        };

        let mut by_key: HashMap<KeyValue, Row> = rows
            .into_iter()
            .filter_map(|row| {
                let key = row.get(&key_column.name).and_then(KeyValue::from_value)?;
                Some((key, row))
            })
            .collect();

        for key in batch {
            let Some(row) = by_key.remove(key) else {
                debug!("{}: key {} no longer in source", table.name, key);
                result.skipped += 1;
                continue;
            };
            result.attempted += 1;

            let update = mode == ReplicationMode::Upsert && existing.contains(key);
            let outcome = match build_statement(table, &row, key, update, encoder) {
                Ok(Some(sql)) => self.target.execute_query(&sql).await.map(|_| ()),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    result.succeeded += 1;
                    if update {
                        result.updated += 1;
                    } else {
                        result.inserted += 1;
                        existing.insert(key.clone());
                    }
                }
                Err(e) if e.is_row_level() => {
                    warn!("{}: row {} failed: {}", table.name, key, e);
                    result.failures.push(RowFailure::from_error(key, &e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }
}

/// Build the `INSERT` or `UPDATE` for one row.
///
/// Returns `None` for an update of a table without non-key columns.
pub fn build_statement(
    table: &TableSpec,
    row: &Row,
    key: &KeyValue,
    update: bool,
    encoder: &Encoder<'_>,
) -> Result<Option<String>> {
    let dialect = encoder.dialect();
    let key_column = table.key_column()?;
    let target_table = dialect.quote_ident(table.target_table());

    let mut columns = Vec::with_capacity(table.columns.len());
    let mut values = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        if update && column.name == key_column.name {
            continue;
        }
        let value = row.get(&column.name).unwrap_or(&Value::Null);
        values.push(encoder.encode(value, column)?.into_string());
        columns.push(dialect.quote_ident(&table.target_column(column)));
    }

    if !update {
        return Ok(Some(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target_table,
            columns.join(", "),
            values.join(", ")
        )));
    }

    if columns.is_empty() {
        return Ok(None);
    }

    let assignments = columns
        .iter()
        .zip(&values)
        .map(|(c, v)| format!("{} = {}", c, v))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Some(format!(
        "UPDATE {} SET {} WHERE {} = {}",
        target_table,
        assignments,
        dialect.quote_ident(&table.target_column(key_column)),
        encoder.encode_key(key, key_column)?
    )))
}
