//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::schema::TableSpec;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source store (the legacy MySQL database).
    pub source: StoreConfig,

    /// Target store (the PostgreSQL replacement).
    pub target: StoreConfig,

    /// Reconciliation behavior.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Tables to reconcile, in processing order.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

/// Database engine of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Mysql,
    Postgres,
}

impl StoreKind {
    /// Default server port.
    pub fn default_port(self) -> u16 {
        match self {
            StoreKind::Mysql => 3306,
            StoreKind::Postgres => 5432,
        }
    }

    /// Default command-line client binary.
    pub fn default_client(self) -> &'static str {
        match self {
            StoreKind::Mysql => "mysql",
            StoreKind::Postgres => "psql",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Mysql => f.write_str("mysql"),
            StoreKind::Postgres => f.write_str("postgres"),
        }
    }
}

/// How statements reach a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Run the command-line client (`mysql`, `psql`), optionally inside a container.
    #[default]
    Process,
    /// Connect with the native driver.
    Native,
}

/// Connection settings of one store.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database engine.
    pub r#type: StoreKind,

    /// Transport (default: process).
    #[serde(default)]
    pub transport: Transport,

    /// Database host, as seen by the client (default: localhost).
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Server port (default: 3306 for MySQL, 5432 for PostgreSQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Container to run the client in (`docker exec`), process transport only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Client binary (default: `mysql` or `psql`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_binary: Option<String>,

    /// Container runtime binary (default: `docker`).
    #[serde(default = "default_docker")]
    pub docker_binary: String,

    /// PostgreSQL schema placed first on the search path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl StoreConfig {
    /// Effective server port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.r#type.default_port())
    }

    /// Effective client binary.
    pub fn client_binary(&self) -> &str {
        self.client_binary
            .as_deref()
            .unwrap_or_else(|| self.r#type.default_client())
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("type", &self.r#type)
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("container", &self.container)
            .field("client_binary", &self.client_binary)
            .field("docker_binary", &self.docker_binary)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Reconciliation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Keys per batch (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds (default: 100).
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Replication mode (default: insert_only).
    #[serde(default)]
    pub mode: ReplicationMode,

    /// Keys per source `SELECT ... IN (...)` statement (default: 500).
    #[serde(default = "default_fetch_chunk_size")]
    pub fetch_chunk_size: usize,

    /// Timeout of every store call in seconds (default: 30).
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Pool size for native transports (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Verification mode (default: count).
    #[serde(default)]
    pub verify_mode: VerifyMode,

    /// Treat an unparseable key listing as an empty key set instead of failing.
    #[serde(default)]
    pub tolerate_unparseable_keys: bool,

    /// In upsert mode, replay every source key instead of only the missing ones.
    #[serde(default)]
    pub refresh: bool,

    /// Missing rows fetched in full for the diff report, per table (default: 10).
    #[serde(default = "default_diff_sample_size")]
    pub diff_sample_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            mode: ReplicationMode::default(),
            fetch_chunk_size: default_fetch_chunk_size(),
            store_timeout_secs: default_store_timeout_secs(),
            max_connections: default_max_connections(),
            verify_mode: VerifyMode::default(),
            tolerate_unparseable_keys: false,
            refresh: false,
            diff_sample_size: default_diff_sample_size(),
        }
    }
}

impl MigrationConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// How missing rows are written to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// Always `INSERT`.
    #[default]
    InsertOnly,

    /// `UPDATE` rows whose key exists in the target, `INSERT` the rest.
    Upsert,
}

/// How source and target are compared after replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Compare row counts.
    #[default]
    Count,

    /// Compare row counts and key sets.
    Keys,
}

// Default value functions for serde
fn default_localhost() -> String {
    "localhost".to_string()
}

fn default_docker() -> String {
    "docker".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_delay_ms() -> u64 {
    100
}

fn default_fetch_chunk_size() -> usize {
    500
}

fn default_store_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> usize {
    4
}

fn default_diff_sample_size() -> usize {
    10
}
