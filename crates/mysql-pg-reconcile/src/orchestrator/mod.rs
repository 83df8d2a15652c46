//! Reconciliation orchestrator - main workflow coordinator.
//!
//! For every configured table a run goes through three phases:
//!
//! 1. **Diff**: compare the key sets of source and target
//! 2. **Replicate**: replay the missing rows (or every row for a refresh)
//! 3. **Verify**: compare the tables again and report any mismatch
//!
//! A failure confined to one table is recorded in that table's outcome and
//! the run moves on. An unavailable store or cancellation stops the run.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ReplicationMode};
use crate::core::schema::TableSpec;
use crate::core::traits::Store;
use crate::core::value::{KeySet, KeyValue};
use crate::diff::{diff_keys, sample_missing, DiffOptions, KeyDiff};
use crate::drivers::open_store;
use crate::error::{ReconcileError, Result, EXIT_DEGRADED};
use crate::replicate::{MigrationReport, ReplicateOptions, Replicator};
use crate::verify::{verify, VerificationResult};

/// Reconciliation orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn Store>,
    target: Arc<dyn Store>,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table is in sync.
    Completed,
    /// Some rows failed or a verification found a mismatch.
    Degraded,
    /// At least one table could not be processed.
    Failed,
    /// Keys were compared, nothing was written.
    DryRun,
}

/// Final status of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Nothing was missing.
    InSync,
    /// Missing rows were replayed and verification matched.
    Reconciled,
    /// Dry run: rows would have been replayed.
    Planned,
    /// Row failures, an unconfirmed key set, or a verification mismatch.
    Degraded,
    /// The table could not be processed.
    Failed,
}

/// Why a table could not be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFailure {
    pub message: String,
    pub exit_code: u8,
}

/// Everything a run learned about one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<KeyDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<MigrationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TableFailure>,
}

impl TableOutcome {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            status: TableStatus::InSync,
            diff: None,
            replication: None,
            verification: None,
            failure: None,
        }
    }

    fn fail(mut self, e: &ReconcileError) -> Self {
        error!("{}: {}", self.table, e);
        self.status = TableStatus::Failed;
        self.failure = Some(TableFailure {
            message: e.to_string(),
            exit_code: e.exit_code(),
        });
        self
    }
}

/// Counters summed over all tables of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub tables_total: usize,
    pub tables_in_sync: usize,
    pub tables_reconciled: usize,
    pub tables_degraded: usize,
    pub tables_failed: usize,
    pub missing_keys: usize,
    pub extra_keys: usize,
    pub rows_attempted: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    pub rows_inserted: usize,
    pub rows_updated: usize,
}

impl RunTotals {
    fn from_outcomes(outcomes: &[TableOutcome]) -> Self {
        let mut totals = RunTotals {
            tables_total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.status {
                TableStatus::InSync => totals.tables_in_sync += 1,
                TableStatus::Reconciled => totals.tables_reconciled += 1,
                TableStatus::Degraded => totals.tables_degraded += 1,
                TableStatus::Failed => totals.tables_failed += 1,
                TableStatus::Planned => {}
            }
            if let Some(ref diff) = outcome.diff {
                totals.missing_keys += diff.missing.len();
                totals.extra_keys += diff.extra.len();
            }
            if let Some(ref report) = outcome.replication {
                totals.rows_attempted += report.total_attempted;
                totals.rows_succeeded += report.total_succeeded;
                totals.rows_failed += report.failed();
                totals.rows_inserted += report.total_inserted;
                totals.rows_updated += report.total_updated;
            }
        }
        totals
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Hash of the configuration the run used.
    pub config_hash: String,

    /// Final status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table outcomes, in configuration order.
    pub tables: Vec<TableOutcome>,

    pub totals: RunTotals,
}

impl RunResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Process exit code for this result.
    ///
    /// A failed table reports its own error's code.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Completed | RunStatus::DryRun => 0,
            RunStatus::Degraded => EXIT_DEGRADED,
            RunStatus::Failed => self
                .tables
                .iter()
                .find_map(|t| t.failure.as_ref().map(|f| f.exit_code))
                .unwrap_or(EXIT_DEGRADED),
        }
    }

    /// Names of the tables that could not be processed.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// Table names present in one store, the other, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableInventory {
    pub source_only: Vec<String>,
    pub target_only: Vec<String>,
    pub common: Vec<String>,
}

impl TableInventory {
    /// Compare two table listings by exact name.
    pub fn compare(source: &BTreeSet<String>, target: &BTreeSet<String>) -> Self {
        Self {
            source_only: source.difference(target).cloned().collect(),
            target_only: target.difference(source).cloned().collect(),
            common: source.intersection(target).cloned().collect(),
        }
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
}

impl Orchestrator {
    /// Create a new orchestrator, opening both stores from the configuration.
    pub fn new(config: Config) -> Result<Self> {
        let max_conns = config.migration.max_connections;
        let timeout = config.migration.store_timeout();
        let source = open_store("source", &config.source, max_conns, timeout)?;
        let target = open_store("target", &config.target, max_conns, timeout)?;
        Ok(Self::with_stores(config, source, target))
    }

    /// Create an orchestrator over already opened stores.
    pub fn with_stores(config: Config, source: Arc<dyn Store>, target: Arc<dyn Store>) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// The configuration this orchestrator runs.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            tolerate_unparseable_keys: self.config.migration.tolerate_unparseable_keys,
        }
    }

    /// Run diff, replication and verification over every configured table.
    pub async fn run(&self, cancel: CancellationToken, dry_run: bool) -> Result<RunResult> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting reconciliation run: {} ({} tables{})",
            run_id,
            self.config.tables.len(),
            if dry_run { ", dry run" } else { "" }
        );

        self.source.ping().await?;
        self.target.ping().await?;

        let replicator = Replicator::new(
            self.source.clone(),
            self.target.clone(),
            ReplicateOptions::from_config(&self.config.migration),
        )
        .with_migration_time(started_at)
        .with_cancellation(cancel.clone());

        let mut outcomes = Vec::with_capacity(self.config.tables.len());
        for table in &self.config.tables {
            if cancel.is_cancelled() {
                warn!("Run cancelled before table {}", table.name);
                return Err(ReconcileError::Cancelled);
            }
            let outcome = match self.reconcile_table(table, &replicator, dry_run).await {
                Ok(outcome) => outcome,
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(e @ ReconcileError::StoreUnavailable { .. }) => {
                    error!("{}: {}, stopping the run", table.name, e);
                    return Err(e);
                }
                Err(e) => TableOutcome::new(&table.name).fail(&e),
            };
            outcomes.push(outcome);
        }

        let totals = RunTotals::from_outcomes(&outcomes);
        let status = if totals.tables_failed > 0 {
            RunStatus::Failed
        } else if totals.tables_degraded > 0 {
            RunStatus::Degraded
        } else if dry_run {
            RunStatus::DryRun
        } else {
            RunStatus::Completed
        };

        let result = RunResult {
            run_id,
            config_hash: self.config.hash(),
            status,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: timer.elapsed().as_secs_f64(),
            tables: outcomes,
            totals,
        };

        info!(
            "Run {} finished: {:?} (attempted={} succeeded={} failed={})",
            result.run_id,
            result.status,
            result.totals.rows_attempted,
            result.totals.rows_succeeded,
            result.totals.rows_failed
        );
        Ok(result)
    }

    async fn reconcile_table(
        &self,
        table: &TableSpec,
        replicator: &Replicator,
        dry_run: bool,
    ) -> Result<TableOutcome> {
        let mut outcome = TableOutcome::new(&table.name);
        let diff = diff_keys(
            self.source.as_ref(),
            self.target.as_ref(),
            table,
            &self.diff_options(),
        )
        .await?;

        let confirmed = diff.is_confirmed();
        let in_sync = diff.in_sync();
        let missing = diff.missing.clone();
        outcome.diff = Some(diff);

        if !confirmed {
            // Replaying against an unobserved key set could duplicate rows.
            warn!("{}: key set not confirmed, skipping replication", table.name);
            outcome.status = TableStatus::Degraded;
            return Ok(outcome);
        }

        let mode = self.config.migration.mode;
        let refresh = self.config.migration.refresh && mode == ReplicationMode::Upsert;

        if dry_run {
            outcome.status = if in_sync && !refresh {
                TableStatus::InSync
            } else {
                TableStatus::Planned
            };
            return Ok(outcome);
        }

        let keys = if refresh {
            let key = table.key_column()?;
            in_key_order(self.source.list_keys(&table.name, key).await?)
        } else {
            missing
        };

        let report = replicator.replicate(table, &keys, mode).await?;
        let verification = verify(
            self.source.as_ref(),
            self.target.as_ref(),
            table,
            self.config.migration.verify_mode,
        )
        .await?;

        outcome.status = if report.failed() > 0 || !verification.matches {
            TableStatus::Degraded
        } else if report.total_attempted == 0 {
            TableStatus::InSync
        } else {
            TableStatus::Reconciled
        };
        outcome.replication = Some(report);
        outcome.verification = Some(verification);
        Ok(outcome)
    }

    /// Compare the key sets of every configured table without writing.
    ///
    /// The first `diff_sample_size` missing rows of each table are fetched in
    /// full from the source.
    pub async fn diff(&self) -> Result<Vec<KeyDiff>> {
        let options = self.diff_options();
        let migration = &self.config.migration;
        let mut diffs = Vec::with_capacity(self.config.tables.len());
        for table in &self.config.tables {
            let mut diff =
                diff_keys(self.source.as_ref(), self.target.as_ref(), table, &options).await?;
            sample_missing(
                self.source.as_ref(),
                table,
                &mut diff,
                migration.diff_sample_size,
                migration.fetch_chunk_size,
            )
            .await?;
            diffs.push(diff);
        }
        Ok(diffs)
    }

    /// Verify every configured table.
    pub async fn verify(&self) -> Result<Vec<VerificationResult>> {
        let mut results = Vec::with_capacity(self.config.tables.len());
        for table in &self.config.tables {
            results.push(
                verify(
                    self.source.as_ref(),
                    self.target.as_ref(),
                    table,
                    self.config.migration.verify_mode,
                )
                .await?,
            );
        }
        Ok(results)
    }

    /// Compare which tables exist in source and target.
    pub async fn compare_tables(&self) -> Result<TableInventory> {
        let source = self.source.list_tables().await?;
        let target = self.target.list_tables().await?;
        info!(
            "Found {} tables in source, {} in target",
            source.len(),
            target.len()
        );
        Ok(TableInventory::compare(&source, &target))
    }

    /// Check that both stores answer.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let (source_connected, source_latency_ms, source_error) =
            ping_timed(self.source.as_ref()).await;
        let (target_connected, target_latency_ms, target_error) =
            ping_timed(self.target.as_ref()).await;

        Ok(HealthCheckResult {
            healthy: source_connected && target_connected,
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
        })
    }
}

/// Sort and deduplicate keys the way a diff orders them, whatever the
/// store's collation returned.
fn in_key_order(keys: Vec<KeyValue>) -> Vec<KeyValue> {
    keys.into_iter().collect::<KeySet>().into_iter().collect()
}

async fn ping_timed(store: &dyn Store) -> (bool, u64, Option<String>) {
    let start = Instant::now();
    let result = store.ping().await;
    let latency = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => (true, latency, None),
        Err(e) => {
            warn!("{}: health check failed: {}", store.name(), e);
            (false, latency, Some(e.to_string()))
        }
    }
}
