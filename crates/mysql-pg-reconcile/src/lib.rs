//! # mysql-pg-reconcile
//!
//! Row-level reconciliation between a legacy MySQL database and its
//! PostgreSQL successor.
//!
//! This library finds the rows a bulk migration left behind and replays
//! them, with support for:
//!
//! - **Key-set diffing** of source and target primary keys
//! - **Batched replication** with per-row failure isolation
//! - **Upsert mode** for refreshing rows that already exist
//! - **Verification** by row counts or key sets
//! - **Two transports**: database client processes (optionally inside
//!   Docker containers) or native driver pools
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_reconcile::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_reconcile::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run(CancellationToken::new(), false).await?;
//!     println!("Replayed {} rows", result.totals.rows_succeeded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod diff;
pub mod drivers;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod replicate;
pub mod report;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, ReplicationMode, StoreConfig, StoreKind, Transport, VerifyMode};
pub use crate::core::{ColumnKind, ColumnSpec, KeyValue, Store, TableSpec, Value};
pub use diff::{diff_exit_code, diff_keys, DiffOptions, KeyDiff, KeyRange};
pub use error::{ReconcileError, Result};
pub use orchestrator::{
    HealthCheckResult, Orchestrator, RunResult, RunStatus, TableInventory, TableOutcome,
    TableStatus,
};
pub use replicate::{MigrationReport, ReplicateOptions, Replicator};
pub use verify::{verify, VerificationResult};
