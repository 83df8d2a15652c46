//! Key-set differencing between source and target.
//!
//! The full key list of both stores is read and compared in memory:
//! `missing = source - target` (to replicate), `extra = target - source`
//! (reported only). For reports, the first missing rows can be fetched in
//! full with [`sample_missing`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::schema::TableSpec;
use crate::core::traits::Store;
use crate::core::value::{KeySet, KeyValue};
use crate::error::{ReconcileError, Result, EXIT_DEGRADED};
use crate::fetch::fetch_rows;

/// A source row in text form, column name to cell (`None` is NULL).
pub type SampleRow = IndexMap<String, Option<String>>;

/// How a key listing that cannot be parsed is handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Treat the side as an empty key set (flagged `Unparseable`) instead of failing.
    pub tolerate_unparseable_keys: bool,
}

/// Whether a side's key set was actually observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySetStatus {
    Confirmed,
    /// The listing could not be parsed and was treated as empty.
    Unparseable(String),
}

impl KeySetStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, KeySetStatus::Confirmed)
    }
}

/// Smallest and largest key of one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub min: KeyValue,
    pub max: KeyValue,
}

impl KeyRange {
    /// Range of a key set, `None` when it is empty.
    pub fn of(keys: &KeySet) -> Option<Self> {
        Some(Self {
            min: keys.first()?.clone(),
            max: keys.last()?.clone(),
        })
    }
}

/// Result of comparing the key sets of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDiff {
    /// Source table name.
    pub table: String,
    /// Keys in the source but not in the target, ascending.
    pub missing: Vec<KeyValue>,
    /// Keys in the target but not in the source, ascending.
    pub extra: Vec<KeyValue>,
    pub source_total: usize,
    pub target_total: usize,
    pub source_status: KeySetStatus,
    pub target_status: KeySetStatus,
    pub source_range: Option<KeyRange>,
    pub target_range: Option<KeyRange>,
    /// Full source rows of the first missing keys, ascending by key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<SampleRow>,
}

impl KeyDiff {
    /// Both key sets were observed.
    pub fn is_confirmed(&self) -> bool {
        self.source_status.is_confirmed() && self.target_status.is_confirmed()
    }

    /// Both sides hold the same keys.
    pub fn in_sync(&self) -> bool {
        self.is_confirmed() && self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Exit code of a diff-only command: degraded unless every table is in sync.
pub fn diff_exit_code(diffs: &[KeyDiff]) -> u8 {
    if diffs.iter().all(KeyDiff::in_sync) {
        0
    } else {
        EXIT_DEGRADED
    }
}

/// Pure set difference: `(source - target, target - source)`, both ascending.
pub fn compare_key_sets(source: &KeySet, target: &KeySet) -> (Vec<KeyValue>, Vec<KeyValue>) {
    let missing = source.difference(target).cloned().collect();
    let extra = target.difference(source).cloned().collect();
    (missing, extra)
}

/// Compare the primary keys of `table` in both stores.
pub async fn diff_keys(
    source: &dyn Store,
    target: &dyn Store,
    table: &TableSpec,
    options: &DiffOptions,
) -> Result<KeyDiff> {
    let key = table.key_column()?;
    let target_key = table.target_key_column()?;

    let source_result = source.list_keys(&table.name, key).await;
    let (source_keys, source_status) = observe(source_result, source.name(), options)?;

    let target_result = target.list_keys(table.target_table(), &target_key).await;
    let (target_keys, target_status) = observe(target_result, target.name(), options)?;

    let (missing, extra) = compare_key_sets(&source_keys, &target_keys);

    info!(
        "{}: source={} target={} missing={} extra={}",
        table.name,
        source_keys.len(),
        target_keys.len(),
        missing.len(),
        extra.len()
    );

    Ok(KeyDiff {
        table: table.name.clone(),
        missing,
        extra,
        source_total: source_keys.len(),
        target_total: target_keys.len(),
        source_range: KeyRange::of(&source_keys),
        target_range: KeyRange::of(&target_keys),
        source_status,
        target_status,
        sample: Vec::new(),
    })
}

/// Fetch the full source rows of the first `limit` missing keys into `diff.sample`.
pub async fn sample_missing(
    source: &dyn Store,
    table: &TableSpec,
    diff: &mut KeyDiff,
    limit: usize,
    chunk_size: usize,
) -> Result<()> {
    let keys = &diff.missing[..diff.missing.len().min(limit)];
    if keys.is_empty() {
        return Ok(());
    }

    let key_column = table.key_column()?;
    let mut rows = fetch_rows(source, table, keys, chunk_size).await?;
    rows.sort_by_cached_key(|row| row.get(&key_column.name).and_then(KeyValue::from_value));
    debug!("{}: sampled {} of {} missing rows", table.name, rows.len(), keys.len());

    diff.sample = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(name, value)| (name.clone(), value.to_cell()))
                .collect()
        })
        .collect();
    Ok(())
}

fn observe(
    result: Result<Vec<KeyValue>>,
    store: &str,
    options: &DiffOptions,
) -> Result<(KeySet, KeySetStatus)> {
    match result {
        Ok(keys) => Ok((keys.into_iter().collect(), KeySetStatus::Confirmed)),
        Err(ReconcileError::Parse { context, message }) if options.tolerate_unparseable_keys => {
            warn!(
                "{}: key listing unparseable ({}: {}), treating as empty",
                store, context, message
            );
            Ok((
                KeySet::new(),
                KeySetStatus::Unparseable(format!("{}: {}", context, message)),
            ))
        }
        Err(e) => Err(e),
    }
}
